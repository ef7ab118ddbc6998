//! Synchronizer scenarios against in-memory stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio::sync::watch;

use shelf_sync::cache::CacheStore;
use shelf_sync::context::SyncContext;
use shelf_sync::error::StoreError;
use shelf_sync::models::{
    CatalogCache, DirEntry, DocumentRecord, PutOptions, RemoteFile, VersionToken,
};
use shelf_sync::store::RemoteStore;
use shelf_sync::store_memory::MemoryStore;
use shelf_sync::sync::{CatalogSynchronizer, SyncOutcome};

// ============ Test stores ============

/// Delegates to a [`MemoryStore`] but holds every read until the gate opens.
struct GatedStore {
    inner: MemoryStore,
    gate: watch::Receiver<bool>,
    calls: AtomicUsize,
}

impl GatedStore {
    fn new(inner: MemoryStore) -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let store = Arc::new(Self {
            inner,
            gate: rx,
            calls: AtomicUsize::new(0),
        });
        (store, tx)
    }

    async fn pass(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.gate.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl RemoteStore for GatedStore {
    fn kind(&self) -> &str {
        "gated"
    }

    async fn get_file(&self, ctx: &SyncContext, path: &str) -> Result<RemoteFile, StoreError> {
        self.pass().await;
        self.inner.get_file(ctx, path).await
    }

    async fn put_file(
        &self,
        ctx: &SyncContext,
        path: &str,
        content: &str,
        opts: PutOptions,
    ) -> Result<VersionToken, StoreError> {
        self.inner.put_file(ctx, path, content, opts).await
    }

    async fn delete_file(
        &self,
        ctx: &SyncContext,
        path: &str,
        version: &VersionToken,
        message: &str,
    ) -> Result<(), StoreError> {
        self.inner.delete_file(ctx, path, version, message).await
    }

    async fn list_directory(
        &self,
        ctx: &SyncContext,
        path: &str,
    ) -> Result<Vec<DirEntry>, StoreError> {
        self.pass().await;
        self.inner.list_directory(ctx, path).await
    }
}

/// Every call fails as if the network were down.
struct OfflineStore;

fn offline(path: &str) -> StoreError {
    StoreError::Network {
        path: path.to_string(),
        detail: "connection refused".to_string(),
    }
}

#[async_trait]
impl RemoteStore for OfflineStore {
    fn kind(&self) -> &str {
        "offline"
    }

    async fn get_file(&self, _ctx: &SyncContext, path: &str) -> Result<RemoteFile, StoreError> {
        Err(offline(path))
    }

    async fn put_file(
        &self,
        _ctx: &SyncContext,
        path: &str,
        _content: &str,
        _opts: PutOptions,
    ) -> Result<VersionToken, StoreError> {
        Err(offline(path))
    }

    async fn delete_file(
        &self,
        _ctx: &SyncContext,
        path: &str,
        _version: &VersionToken,
        _message: &str,
    ) -> Result<(), StoreError> {
        Err(offline(path))
    }

    async fn list_directory(
        &self,
        _ctx: &SyncContext,
        path: &str,
    ) -> Result<Vec<DirEntry>, StoreError> {
        Err(offline(path))
    }
}

// ============ Helpers ============

fn ctx() -> SyncContext {
    SyncContext::new("acme", "library", "main", "docs")
}

fn cache_in(tmp: &TempDir) -> CacheStore {
    CacheStore::new(tmp.path().join("catalog-cache.json"))
}

fn seed_cache(tmp: &TempDir, documents: &[DocumentRecord], age: Duration) {
    cache_in(tmp)
        .save(&CatalogCache::new(documents, Utc::now() - age))
        .unwrap();
}

fn cached_doc() -> DocumentRecord {
    DocumentRecord::new(
        "to_hoai_de_men_1700000000000",
        "De Men",
        "To Hoai",
        "to_hoai",
        "to_hoai/de_men.html",
    )
}

// ============ Scenarios ============

#[tokio::test]
async fn first_run_synthesizes_records_for_uncatalogued_files() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "docs/nguyen_nhat_anh/toi_thay_hoa_vang.html",
        "<h1>Tôi thấy hoa vàng trên cỏ xanh</h1>",
    );
    let sync = CatalogSynchronizer::new(store, ctx(), cache_in(&tmp));
    let mut rx = sync.subscribe();

    let report = sync.sync().await;

    assert_eq!(report.outcome, SyncOutcome::Updated);
    assert!(!report.served_from_cache);
    assert_eq!(report.added, 1);
    assert_eq!(report.documents.len(), 1);
    let doc = &report.documents[0];
    assert_eq!(doc.file, "nguyen_nhat_anh/toi_thay_hoa_vang.html");
    assert_eq!(doc.author_slug, "nguyen_nhat_anh");
    assert_eq!(doc.author, "Nguyen Nhat Anh");
    assert_eq!(doc.title, "Toi Thay Hoa Vang");
    assert!(doc.id.starts_with("nguyen_nhat_anh_toi_thay_hoa_vang_"));
    assert!(doc.file_size.is_some());
    assert!(doc.created_at.is_some());

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().len(), 1);

    let cached = cache_in(&tmp).load().unwrap();
    assert_eq!(cached.documents.len(), 1);
    assert_eq!(cached.documents[0].identity_key(), doc.identity_key());
}

#[tokio::test]
async fn second_sync_is_unchanged_and_refreshes_last_sync() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert("docs/a/one.html", "1");
    let sync = CatalogSynchronizer::new(store, ctx(), cache_in(&tmp));

    let first = sync.sync().await;
    assert_eq!(first.outcome, SyncOutcome::Updated);
    let first_sync = cache_in(&tmp).load().unwrap().last_sync;

    let second = sync.sync().await;
    assert_eq!(second.outcome, SyncOutcome::Unchanged);
    assert_eq!(second.added, 0);
    assert_eq!(second.documents.len(), 1);
    // the synthesized id from the first run survives
    assert_eq!(second.documents[0].id, first.documents[0].id);
    assert!(cache_in(&tmp).load().unwrap().last_sync >= first_sync);
}

#[tokio::test]
async fn fresh_cache_is_exposed_before_network_completes() {
    let tmp = TempDir::new().unwrap();
    seed_cache(&tmp, &[cached_doc()], Duration::hours(1));

    let inner = MemoryStore::new();
    inner.insert("docs/a/new.html", "new");
    let (store, gate) = GatedStore::new(inner);
    let sync = CatalogSynchronizer::new(store.clone(), ctx(), cache_in(&tmp));
    let mut rx = sync.subscribe();

    let (report, ()) = tokio::join!(sync.sync(), async {
        rx.changed().await.unwrap();
        let exposed = rx.borrow_and_update().clone();
        assert_eq!(exposed.len(), 1);
        assert_eq!(exposed[0].id, "to_hoai_de_men_1700000000000");
        // discovery is still held at the gate
        assert_eq!(sync.current().len(), 1);
        gate.send(true).unwrap();
    });

    assert!(report.served_from_cache);
    assert_eq!(report.outcome, SyncOutcome::Updated);
    let files: Vec<_> = report.documents.iter().map(|d| d.file.as_str()).collect();
    assert_eq!(files, vec!["to_hoai/de_men.html", "a/new.html"]);
}

#[tokio::test]
async fn stale_cache_is_not_exposed() {
    let tmp = TempDir::new().unwrap();
    seed_cache(&tmp, &[cached_doc()], Duration::hours(25));

    let sync = CatalogSynchronizer::new(Arc::new(OfflineStore), ctx(), cache_in(&tmp));
    let report = sync.sync().await;

    assert!(!report.served_from_cache);
    assert!(matches!(report.outcome, SyncOutcome::Offline { .. }));
    assert!(report.documents.is_empty());
}

#[tokio::test]
async fn offline_keeps_cached_view_without_error() {
    let tmp = TempDir::new().unwrap();
    seed_cache(&tmp, &[cached_doc()], Duration::minutes(5));

    let sync = CatalogSynchronizer::new(Arc::new(OfflineStore), ctx(), cache_in(&tmp));
    let report = sync.sync().await;

    match &report.outcome {
        SyncOutcome::Offline { reason } => assert!(reason.contains("connection refused")),
        other => panic!("expected offline, got {other:?}"),
    }
    assert!(report.served_from_cache);
    assert_eq!(report.documents.len(), 1);
    assert_eq!(sync.current().len(), 1);
    // the cache file is untouched
    assert_eq!(cache_in(&tmp).load().unwrap().documents.len(), 1);
}

#[tokio::test]
async fn overlapping_syncs_are_coalesced() {
    let tmp = TempDir::new().unwrap();
    let inner = MemoryStore::new();
    inner.insert("docs/a/one.html", "1");
    let (store, gate) = GatedStore::new(inner);
    let sync = CatalogSynchronizer::new(store.clone(), ctx(), cache_in(&tmp));

    let (first, second, ()) = tokio::join!(sync.sync(), sync.sync(), async {
        while store.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        gate.send(true).unwrap();
    });

    assert_eq!(first.outcome, SyncOutcome::Updated);
    assert_eq!(second.outcome, SyncOutcome::Coalesced);
    assert_eq!(second.documents.len(), 1);
    // catalog fetch, base listing, one author listing
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn remote_catalog_wins_over_synthesized_duplicates() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "docs/documents.json",
        r#"[
          {"id":"a_one_1","title":"One (edited)","author":"A","authorSlug":"a","file":"a/one.html"},
          {"id":"a_one_2","title":"Stale copy","author":"A","authorSlug":"a","file":"a/one.html"},
          {"title":"no id or file"}
        ]"#,
    );
    store.insert("docs/a/one.html", "1");
    store.insert("docs/a/two.html", "2");
    let sync = CatalogSynchronizer::new(store, ctx(), cache_in(&tmp));

    let report = sync.sync().await;
    let titles: Vec<_> = report.documents.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["One (edited)", "Two"]);
}

#[tokio::test]
async fn malformed_catalog_decodes_as_empty() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert("docs/documents.json", r#"{"documents": []}"#);
    store.insert("docs/a/one.html", "1");
    let sync = CatalogSynchronizer::new(store, ctx(), cache_in(&tmp));

    let report = sync.sync().await;
    assert_eq!(report.outcome, SyncOutcome::Updated);
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.documents[0].title, "One");
}

#[tokio::test]
async fn adopted_catalog_is_kept_by_the_next_sync() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert("docs/a/one.html", "1");
    let sync = CatalogSynchronizer::new(store, ctx(), cache_in(&tmp));

    let mut edited = DocumentRecord::new("a_one_1", "Renamed", "A", "a", "a/one.html");
    edited.pinned = true;
    sync.adopt(vec![edited]);

    let report = sync.sync().await;
    assert_eq!(report.outcome, SyncOutcome::Unchanged);
    assert_eq!(report.documents[0].title, "Renamed");
    assert!(report.documents[0].pinned);
}
