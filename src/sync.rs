//! Catalog synchronization.
//!
//! Reconciles three views of the document catalog into one deduplicated
//! list:
//!
//! ```text
//! local cache ──(fresh?)──▶ exposed catalog ◀── merge ── remote catalog file
//!                                                   ▲
//!                                                   └── author folder scan
//! ```
//!
//! # Pipeline
//!
//! 1. **Fast path.** A cache younger than `cache.max_age_hours` is exposed
//!    immediately, before any network call.
//! 2. **Discovery.** The remote catalog file is fetched while the base
//!    directory is listed; author folders are then listed as a bounded
//!    concurrent batch. Content files not represented in the catalog file
//!    get a synthesized record.
//! 3. **Merge.** Discovered records whose identity key is not yet exposed
//!    are appended, then the result is deduplicated (first wins).
//! 4. **Publish.** If the identity set changed, the new catalog is pushed on
//!    the change channel. The cache is rewritten either way.
//!
//! Discovery failures are not errors: the exposed catalog stays and the
//! report says [`SyncOutcome::Offline`].
//!
//! # Concurrency
//!
//! Overlapping [`sync`](CatalogSynchronizer::sync) calls are coalesced: a
//! call that finds another in flight waits for it to finish and returns its
//! result as [`SyncOutcome::Coalesced`] without touching the network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::catalog::{decode_catalog, dedup, discovered_record, has_changed, merge, sort_pinned_first};
use crate::config::Config;
use crate::context::SyncContext;
use crate::error::StoreError;
use crate::models::{CatalogCache, DirEntry, DocumentRecord, EntryKind};
use crate::progress::{NoProgress, ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::store::{create_store, RemoteStore};

/// How a [`sync`](CatalogSynchronizer::sync) call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The identity set changed and the new catalog was published.
    Updated,
    /// Remote and exposed catalogs agree; only `lastSync` was refreshed.
    Unchanged,
    /// Discovery failed; the exposed catalog was left as is.
    Offline { reason: String },
    /// Another sync was already running; this call waited for it.
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// The exposed catalog after the call.
    pub documents: Arc<Vec<DocumentRecord>>,
    /// Records appended by this call.
    pub added: usize,
    /// Whether a fresh cache was exposed before discovery.
    pub served_from_cache: bool,
}

pub struct CatalogSynchronizer {
    store: Arc<dyn RemoteStore>,
    ctx: SyncContext,
    cache: CacheStore,
    max_cache_age: chrono::Duration,
    content_globs: GlobSet,
    scan_concurrency: usize,
    catalog: watch::Sender<Arc<Vec<DocumentRecord>>>,
    in_flight: Mutex<()>,
    reporter: Box<dyn SyncProgressReporter>,
}

impl CatalogSynchronizer {
    /// Defaults: 24h cache age, `*.html` content files, 8 concurrent author
    /// scans, no progress output.
    pub fn new(store: Arc<dyn RemoteStore>, ctx: SyncContext, cache: CacheStore) -> Self {
        let (catalog, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            store,
            ctx,
            cache,
            max_cache_age: chrono::Duration::hours(24),
            content_globs: html_only(),
            scan_concurrency: 8,
            catalog,
            in_flight: Mutex::new(()),
            reporter: Box::new(NoProgress),
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn RemoteStore>,
        ctx: SyncContext,
        reporter: Box<dyn SyncProgressReporter>,
    ) -> Result<Self> {
        Ok(Self::new(store, ctx, CacheStore::new(&config.cache.path))
            .with_max_cache_age(config.cache.max_age())
            .with_content_globs(&config.remote.content_globs)?
            .with_scan_concurrency(config.remote.scan_concurrency)
            .with_reporter(reporter))
    }

    pub fn with_max_cache_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_cache_age = max_age;
        self
    }

    pub fn with_content_globs(mut self, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(
                Glob::new(pattern).with_context(|| format!("Invalid content glob: '{}'", pattern))?,
            );
        }
        self.content_globs = builder.build()?;
        Ok(self)
    }

    pub fn with_scan_concurrency(mut self, n: usize) -> Self {
        self.scan_concurrency = n.max(1);
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn SyncProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// The currently exposed catalog.
    pub fn current(&self) -> Arc<Vec<DocumentRecord>> {
        self.catalog.borrow().clone()
    }

    /// Change channel; receivers see every published catalog.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<DocumentRecord>>> {
        self.catalog.subscribe()
    }

    /// Replace the exposed catalog after a confirmed remote write.
    pub fn adopt(&self, documents: Vec<DocumentRecord>) {
        let documents = dedup(documents);
        self.persist(&documents);
        self.catalog.send_replace(Arc::new(documents));
    }

    pub async fn sync(&self) -> SyncReport {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let _wait = self.in_flight.lock().await;
                return SyncReport {
                    outcome: SyncOutcome::Coalesced,
                    documents: self.current(),
                    added: 0,
                    served_from_cache: false,
                };
            }
        };

        let served_from_cache = self.expose_fresh_cache();

        self.reporter.report(SyncProgressEvent::Discovering {
            store: self.store.kind().to_string(),
        });
        let remote = match self.discover().await {
            Ok(remote) => remote,
            Err(e) => {
                let reason = e.to_string();
                warn!(repo = %self.ctx.label(), error = %reason, "catalog discovery failed; keeping cached view");
                self.reporter.report(SyncProgressEvent::Offline {
                    reason: reason.clone(),
                });
                return SyncReport {
                    outcome: SyncOutcome::Offline { reason },
                    documents: self.current(),
                    added: 0,
                    served_from_cache,
                };
            }
        };

        let previous = self.current();
        let merged = merge(&previous, &remote);
        let added = merged.len() - previous.len();
        let candidate = dedup(merged);
        let changed = has_changed(&previous, &candidate);
        self.persist(&candidate);

        self.reporter.report(SyncProgressEvent::Reconciled {
            documents: candidate.len(),
            changed,
        });

        if changed {
            info!(repo = %self.ctx.label(), documents = candidate.len(), added, "catalog updated");
            self.catalog.send_replace(Arc::new(candidate));
            SyncReport {
                outcome: SyncOutcome::Updated,
                documents: self.current(),
                added,
                served_from_cache,
            }
        } else {
            SyncReport {
                outcome: SyncOutcome::Unchanged,
                documents: previous,
                added: 0,
                served_from_cache,
            }
        }
    }

    fn expose_fresh_cache(&self) -> bool {
        let Some(cache) = self.cache.load() else {
            return false;
        };
        if !cache.is_fresh(Utc::now(), self.max_cache_age) {
            return false;
        }
        self.reporter.report(SyncProgressEvent::CachedView {
            documents: cache.documents.len(),
        });
        // subscribers only hear about it if the identity set moved
        self.catalog.send_if_modified(|exposed| {
            let changed = has_changed(exposed, &cache.documents);
            *exposed = Arc::new(cache.documents);
            changed
        });
        true
    }

    fn persist(&self, documents: &[DocumentRecord]) {
        if let Err(e) = self.cache.save(&CatalogCache::new(documents, Utc::now())) {
            warn!(error = %e, "failed to persist catalog cache");
        }
    }

    /// Remote catalog records followed by records synthesized for content
    /// files the catalog does not mention.
    async fn discover(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let (listed, scanned) = tokio::join!(self.fetch_catalog(), self.scan_authors());
        let listed = listed?;
        let scanned = scanned?;

        let known: HashSet<String> = listed.iter().map(DocumentRecord::identity_key).collect();
        let now = Utc::now();
        let mut discovered = listed;
        for (author, entries) in scanned {
            for entry in entries {
                if entry.kind != EntryKind::File || !self.content_globs.is_match(&entry.name) {
                    continue;
                }
                let doc = discovered_record(&author, &entry, now);
                if !known.contains(&doc.identity_key()) {
                    discovered.push(doc);
                }
            }
        }
        Ok(dedup(discovered))
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        match self.store.get_file(&self.ctx, self.ctx.catalog_path()).await {
            Ok(file) => Ok(decode_catalog(&file.content)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn scan_authors(&self) -> Result<Vec<(String, Vec<DirEntry>)>, StoreError> {
        let entries = match self.store.list_directory(&self.ctx, &self.ctx.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let authors: Vec<String> = entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Dir && !e.name.starts_with('.'))
            .map(|e| e.name)
            .collect();

        let total = authors.len() as u64;
        let done = AtomicU64::new(0);
        let done = &done;

        stream::iter(authors)
            .map(|author| async move {
                let path = self.ctx.author_dir(&author);
                let files = match self.store.list_directory(&self.ctx, &path).await {
                    Ok(files) => files,
                    // removed between the two listings
                    Err(e) if e.is_not_found() => Vec::new(),
                    Err(e) => return Err(e),
                };
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                self.reporter.report(SyncProgressEvent::Scanning {
                    author: author.clone(),
                    n,
                    total,
                });
                Ok((author, files))
            })
            .buffered(self.scan_concurrency)
            .try_collect()
            .await
    }
}

fn html_only() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    if let Ok(glob) = Glob::new("*.html") {
        builder.add(glob);
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

// ============ CLI ============

pub async fn run_sync(config: &Config, mode: ProgressMode) -> Result<()> {
    let store = create_store(config)?;
    let ctx = SyncContext::from_config(&config.remote);
    let label = ctx.label();
    let synchronizer =
        CatalogSynchronizer::from_config(config, store, ctx, mode.reporter(&label))?;

    let report = synchronizer.sync().await;

    println!("sync {}", label);
    if report.served_from_cache {
        println!("  cache: fresh (shown before discovery)");
    }
    match &report.outcome {
        SyncOutcome::Updated => println!("  status: updated"),
        SyncOutcome::Unchanged => println!("  status: unchanged"),
        SyncOutcome::Offline { reason } => println!("  status: offline ({})", reason),
        SyncOutcome::Coalesced => println!("  status: coalesced"),
    }
    println!("  documents: {}", report.documents.len());
    println!("  added: {}", report.added);
    println!("ok");
    Ok(())
}

/// Print the cached catalog, pinned documents first.
pub fn run_list(config: &Config) -> Result<()> {
    let cache = CacheStore::new(&config.cache.path);
    let Some(cache) = cache.load() else {
        println!("No cached catalog. Run `shelf sync` first.");
        return Ok(());
    };

    let mut documents = cache.documents;
    sort_pinned_first(&mut documents);

    println!(
        "{:<2} {:<40} {:<28} {}",
        "", "TITLE", "AUTHOR", "ID"
    );
    println!("{}", "-".repeat(100));
    for doc in &documents {
        let pin = if doc.pinned { "*" } else { "" };
        println!(
            "{:<2} {:<40} {:<28} {}",
            pin,
            truncate(&doc.title, 40),
            truncate(&doc.author, 28),
            doc.id
        );
    }
    println!();
    println!(
        "{} documents, last sync {}",
        documents.len(),
        cache.last_sync.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
