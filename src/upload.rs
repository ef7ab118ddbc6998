//! Catalog-mutating commands: `upload`, `replace`, `pin`.
//!
//! Each command writes through [`CatalogWriter`] and, once the write is
//! confirmed, hands the resulting catalog to the synchronizer so the local
//! cache reflects it without another sync.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};

use crate::cache::CacheStore;
use crate::catalog::merge;
use crate::config::Config;
use crate::context::SyncContext;
use crate::metadata::{extract_metadata, with_metadata, BookMetadata};
use crate::models::DocumentRecord;
use crate::progress::NoProgress;
use crate::slug::{document_id, filename_to_title, slugify};
use crate::store::{create_store, RemoteStore};
use crate::sync::CatalogSynchronizer;
use crate::writer::CatalogWriter;

/// Fields of a new upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub published_date: Option<String>,
    pub content: String,
}

/// Upload a content blob and register it in the catalog.
///
/// The blob lands at `<authorSlug>/<titleSlug>.html` with a metadata
/// header. Re-uploading the same title for the same author replaces the
/// existing record instead of adding a second one.
pub async fn upload_document(
    writer: &CatalogWriter,
    request: UploadRequest,
) -> Result<(DocumentRecord, Vec<DocumentRecord>)> {
    let author_slug = slugify(&request.author);
    let title_slug = slugify(&request.title);
    if author_slug.is_empty() || title_slug.is_empty() {
        bail!("title and author must contain at least one letter or digit");
    }

    let now = Utc::now();
    let file = format!("{}/{}.html", author_slug, title_slug);
    let meta = BookMetadata {
        title: Some(request.title.clone()),
        author: Some(request.author.clone()),
        description: request.description.clone(),
        published_date: request.published_date.clone(),
        created_at: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ..Default::default()
    };
    let content = with_metadata(&meta, &request.content);

    let path = writer.context().content_path(&file);
    writer
        .write_file(&path, &content, &format!("Upload {}", request.title))
        .await
        .context("Failed to upload document content")?;

    let mut record = DocumentRecord::new(
        document_id(&author_slug, &title_slug, now),
        request.title,
        request.author,
        author_slug,
        file,
    );
    record.description = request.description;
    record.file_size = Some(content.len() as u64);

    let (existing, _) = writer
        .read_catalog()
        .await
        .context("Failed to read remote catalog")?;
    let key = record.identity_key();
    if let Some(previous) = existing.iter().find(|d| d.identity_key() == key) {
        record.id = previous.id.clone();
        record.created_at = previous.created_at;
        record.pinned = previous.pinned;
    }

    let update = writer
        .upsert_document(record.clone())
        .await
        .context("Failed to update catalog")?;
    let stored = update
        .documents
        .iter()
        .find(|d| d.id == record.id)
        .cloned()
        .unwrap_or(record);
    Ok((stored, update.documents))
}

struct Session {
    store: Arc<dyn RemoteStore>,
    ctx: SyncContext,
    writer: CatalogWriter,
}

impl Session {
    fn open(config: &Config) -> Result<Self> {
        let store = create_store(config)?;
        let ctx = SyncContext::from_config(&config.remote);
        let writer = CatalogWriter::new(store.clone(), ctx.clone(), config.writer.max_attempts);
        Ok(Self { store, ctx, writer })
    }

    /// Make `written` the local view, keeping cached records the remote
    /// catalog does not list (e.g. discovered files). Cached records matching
    /// `removed` by id or identity key are dropped.
    fn adopt(
        self,
        config: &Config,
        written: Vec<DocumentRecord>,
        removed: &[DocumentRecord],
    ) -> Result<()> {
        let removed_ids: HashSet<&str> = removed.iter().map(|d| d.id.as_str()).collect();
        let removed_keys: HashSet<String> =
            removed.iter().map(DocumentRecord::identity_key).collect();
        let cached: Vec<DocumentRecord> = CacheStore::new(&config.cache.path)
            .load()
            .map(|c| c.documents)
            .unwrap_or_default()
            .into_iter()
            .filter(|d| {
                !removed_ids.contains(d.id.as_str()) && !removed_keys.contains(&d.identity_key())
            })
            .collect();
        let synchronizer =
            CatalogSynchronizer::from_config(config, self.store, self.ctx, Box::new(NoProgress))?;
        synchronizer.adopt(merge(&written, &cached));
        Ok(())
    }
}

pub async fn run_upload(
    config: &Config,
    file: &Path,
    author: &str,
    title: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let embedded = extract_metadata(&content).unwrap_or_default();

    let title = match title.or(embedded.title) {
        Some(t) => t,
        None => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            filename_to_title(&name)
        }
    };

    let session = Session::open(config)?;
    let (record, documents) = upload_document(
        &session.writer,
        UploadRequest {
            title,
            author: author.to_string(),
            description: description.or(embedded.description),
            published_date: embedded.published_date,
            content,
        },
    )
    .await?;

    println!("upload {}", record.title);
    println!("  id: {}", record.id);
    println!("  file: {}", session.ctx.content_path(&record.file));
    println!("  catalog: {} documents", documents.len());
    session.adopt(config, documents, &[])?;
    println!("ok");
    Ok(())
}

/// Overwrite the remote catalog with the records in `json_path`.
pub async fn run_replace(config: &Config, json_path: &Path, prune: bool) -> Result<()> {
    let content = std::fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read {}", json_path.display()))?;
    let records: Vec<DocumentRecord> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a catalog array", json_path.display()))?;

    let session = Session::open(config)?;
    let (original, _) = session
        .writer
        .read_catalog()
        .await
        .context("Failed to read remote catalog")?;
    let update = session
        .writer
        .bulk_replace(records)
        .await
        .context("Failed to replace catalog")?;

    println!("replace {}", session.ctx.catalog_path());
    println!("  documents: {} -> {}", original.len(), update.documents.len());
    if prune {
        let deleted = session
            .writer
            .delete_removed(&original, &update.documents)
            .await;
        println!("  deleted blobs: {}", deleted);
    }
    let removed = dropped_records(&original, &update.documents);
    session.adopt(config, update.documents, &removed)?;
    println!("ok");
    Ok(())
}

/// Records of `original` whose id is missing from `kept`.
fn dropped_records(original: &[DocumentRecord], kept: &[DocumentRecord]) -> Vec<DocumentRecord> {
    let kept_ids: HashSet<&str> = kept.iter().map(|d| d.id.as_str()).collect();
    original
        .iter()
        .filter(|d| !kept_ids.contains(d.id.as_str()))
        .cloned()
        .collect()
}

/// Set or clear the `pinned` flag of one document.
pub async fn run_pin(config: &Config, id: &str, pinned: bool) -> Result<()> {
    let session = Session::open(config)?;
    let (documents, _) = session
        .writer
        .read_catalog()
        .await
        .context("Failed to read remote catalog")?;
    let Some(mut record) = documents.into_iter().find(|d| d.id == id) else {
        bail!("document not found in remote catalog: {}", id);
    };
    record.pinned = pinned;

    let update = session
        .writer
        .upsert_document(record)
        .await
        .context("Failed to update catalog")?;

    println!("{} {}", if pinned { "pin" } else { "unpin" }, id);
    session.adopt(config, update.documents, &[])?;
    println!("ok");
    Ok(())
}
