//! Document retrieval by id.
//!
//! Resolves a catalog record (cached catalog first, then the remote
//! catalog), fetches its content blob, and separates the embedded metadata
//! block from the body. Used by `shelf show`.

use anyhow::{bail, Context, Result};

use crate::access_log::{AccessEntry, AccessLog};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::context::SyncContext;
use crate::metadata::{extract_metadata, strip_metadata, BookMetadata};
use crate::models::DocumentRecord;
use crate::store::{create_store, RemoteStore};
use crate::writer::CatalogWriter;

/// A record together with its fetched content.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub record: DocumentRecord,
    pub metadata: Option<BookMetadata>,
    /// Content with the metadata block removed.
    pub body: String,
    pub raw: String,
}

/// Fetch the content blob of `record`.
pub async fn fetch_document(
    store: &dyn RemoteStore,
    ctx: &SyncContext,
    record: DocumentRecord,
) -> Result<DocumentContent> {
    let path = ctx.content_path(&record.file);
    let file = store
        .get_file(ctx, &path)
        .await
        .with_context(|| format!("Failed to fetch document content: {}", path))?;
    Ok(DocumentContent {
        metadata: extract_metadata(&file.content),
        body: strip_metadata(&file.content),
        raw: file.content,
        record,
    })
}

pub async fn run_show(config: &Config, id: &str, raw: bool) -> Result<()> {
    let store = create_store(config)?;
    let ctx = SyncContext::from_config(&config.remote);

    let cached = CacheStore::new(&config.cache.path)
        .load()
        .and_then(|cache| cache.documents.into_iter().find(|d| d.id == id));
    let record = match cached {
        Some(record) => record,
        None => {
            let writer = CatalogWriter::new(store.clone(), ctx.clone(), config.writer.max_attempts);
            let (documents, _) = writer
                .read_catalog()
                .await
                .context("Failed to read remote catalog")?;
            match documents.into_iter().find(|d| d.id == id) {
                Some(record) => record,
                None => bail!("document not found: {}", id),
            }
        }
    };

    let doc = fetch_document(store.as_ref(), &ctx, record).await?;

    let device = config
        .access_log
        .device_id
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let log = AccessLog::new(&config.access_log.path, config.access_log.capacity);
    if let Err(e) = log.record(AccessEntry::new(device, "open_document", &doc.record.title)) {
        tracing::warn!(error = %e, "failed to record access");
    }

    if raw {
        print!("{}", doc.raw);
        return Ok(());
    }

    let meta = doc.metadata.unwrap_or_default();
    println!("--- Document ---");
    println!("id:           {}", doc.record.id);
    println!(
        "title:        {}",
        meta.title.as_deref().unwrap_or(&doc.record.title)
    );
    println!(
        "author:       {}",
        meta.author.as_deref().unwrap_or(&doc.record.author)
    );
    if let Some(date) = meta.published_date.as_deref() {
        println!("published:    {}", date);
    }
    if let Some(desc) = meta.description.as_deref().or(doc.record.description.as_deref()) {
        println!("description:  {}", desc);
    }
    println!("file:         {}", doc.record.file);
    if let Some(updated) = doc.record.updated_at {
        println!("updated_at:   {}", updated.to_rfc3339());
    }
    println!();
    println!("--- Body ---");
    println!("{}", doc.body);
    Ok(())
}
