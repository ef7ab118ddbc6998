//! Optimistic-concurrency writes to the remote catalog.
//!
//! Every write is a read-modify-write cycle against a version token:
//!
//! ```text
//! read (content, token) ──▶ apply change ──▶ put(content, token)
//!        ▲                                        │
//!        └──────────── Conflict, attempts left ◀──┘
//! ```
//!
//! On a conflict the writer re-reads and re-applies the change to the fresh
//! content, so a concurrent writer's records are kept. After
//! `max_attempts` conflicting puts the operation fails with
//! [`WriteError::ConflictExhausted`]. Any other store failure aborts
//! immediately with [`WriteError::Remote`]; those are never retried.
//!
//! The writer never touches local state. Callers update their view only
//! after a write is confirmed (see
//! [`CatalogSynchronizer::adopt`](crate::sync::CatalogSynchronizer::adopt)).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::{decode_catalog, encode_catalog, upsert_by_id};
use crate::context::SyncContext;
use crate::error::{StoreError, WriteError};
use crate::models::{DocumentRecord, PutOptions, VersionToken};
use crate::store::RemoteStore;

/// Result of a confirmed catalog write.
#[derive(Debug, Clone)]
pub struct CatalogUpdate {
    pub version: VersionToken,
    pub documents: Vec<DocumentRecord>,
}

pub struct CatalogWriter {
    store: Arc<dyn RemoteStore>,
    ctx: SyncContext,
    max_attempts: u32,
}

impl CatalogWriter {
    pub fn new(store: Arc<dyn RemoteStore>, ctx: SyncContext, max_attempts: u32) -> Self {
        Self {
            store,
            ctx,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Fetch and decode the remote catalog. A missing catalog is empty and
    /// has no token.
    pub async fn read_catalog(
        &self,
    ) -> Result<(Vec<DocumentRecord>, Option<VersionToken>), StoreError> {
        match self.store.get_file(&self.ctx, self.ctx.catalog_path()).await {
            Ok(file) => Ok((decode_catalog(&file.content), Some(file.version))),
            Err(e) if e.is_not_found() => Ok((Vec::new(), None)),
            Err(e) => Err(e),
        }
    }

    /// Insert `record`, or replace the entry with the same `id`.
    ///
    /// Stamps `updatedAt` (and a missing `createdAt`) with the current time.
    pub async fn upsert_document(
        &self,
        mut record: DocumentRecord,
    ) -> Result<CatalogUpdate, WriteError> {
        record.touch(Utc::now());
        record.is_new = false;
        let message = format!("Update catalog: {}", record.title);
        self.write_catalog(&message, |mut documents| {
            upsert_by_id(&mut documents, record.clone());
            documents
        })
        .await
    }

    /// Overwrite the whole catalog with `records`. Last writer wins.
    pub async fn bulk_replace(
        &self,
        records: Vec<DocumentRecord>,
    ) -> Result<CatalogUpdate, WriteError> {
        let records: Vec<DocumentRecord> = records
            .into_iter()
            .map(|mut doc| {
                doc.is_new = false;
                doc
            })
            .collect();
        let message = format!("Replace catalog ({} documents)", records.len());
        self.write_catalog(&message, |_| records.clone()).await
    }

    async fn write_catalog<F>(&self, message: &str, mut apply: F) -> Result<CatalogUpdate, WriteError>
    where
        F: FnMut(Vec<DocumentRecord>) -> Vec<DocumentRecord>,
    {
        let path = self.ctx.catalog_path().to_string();
        let mut last_conflict = String::new();

        for attempt in 1..=self.max_attempts {
            let (current, version) = self
                .read_catalog()
                .await
                .map_err(|source| WriteError::Remote {
                    path: path.clone(),
                    source,
                })?;
            let documents = apply(current);
            let content = encode_catalog(&documents).map_err(|source| WriteError::Encode {
                path: path.clone(),
                source,
            })?;

            let opts = PutOptions {
                message: message.to_string(),
                version,
            };
            match self.store.put_file(&self.ctx, &path, &content, opts).await {
                Ok(version) => {
                    info!(path = %path, attempt, documents = documents.len(), "catalog written");
                    return Ok(CatalogUpdate { version, documents });
                }
                Err(StoreError::Conflict { detail, .. }) => {
                    warn!(path = %path, attempt, detail = %detail, "catalog write conflicted");
                    last_conflict = detail;
                }
                Err(source) => {
                    return Err(WriteError::Remote { path, source });
                }
            }
        }

        Err(WriteError::ConflictExhausted {
            path,
            attempts: self.max_attempts,
            detail: last_conflict,
        })
    }

    /// Upload an arbitrary file (content blob or metadata file).
    ///
    /// On a conflict the remote content is re-read; if both sides are JSON
    /// objects they are shallow-merged (remote keys, then local keys) before
    /// retrying, otherwise the local content is retried as-is.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<VersionToken, WriteError> {
        let remote_err = |source: StoreError| WriteError::Remote {
            path: path.to_string(),
            source,
        };

        let mut content = content.to_string();
        let mut version = self.current_version(path).await.map_err(remote_err)?;
        let mut last_conflict = String::new();

        for attempt in 1..=self.max_attempts {
            let opts = PutOptions {
                message: message.to_string(),
                version: version.clone(),
            };
            match self.store.put_file(&self.ctx, path, &content, opts).await {
                Ok(version) => return Ok(version),
                Err(StoreError::Conflict { detail, .. }) => {
                    warn!(path, attempt, detail = %detail, "file write conflicted");
                    last_conflict = detail;
                    if attempt == self.max_attempts {
                        break;
                    }
                    match self.store.get_file(&self.ctx, path).await {
                        Ok(remote) => {
                            if let Some(merged) = merge_json_objects(&remote.content, &content) {
                                content = merged;
                            }
                            version = Some(remote.version);
                        }
                        Err(e) if e.is_not_found() => version = None,
                        Err(e) => return Err(remote_err(e)),
                    }
                }
                Err(e) => return Err(remote_err(e)),
            }
        }

        Err(WriteError::ConflictExhausted {
            path: path.to_string(),
            attempts: self.max_attempts,
            detail: last_conflict,
        })
    }

    /// Delete the content blobs of records in `original` whose id is not in
    /// `kept`. Failures are logged and skipped. Returns the number deleted.
    pub async fn delete_removed(
        &self,
        original: &[DocumentRecord],
        kept: &[DocumentRecord],
    ) -> usize {
        let kept_ids: HashSet<&str> = kept.iter().map(|doc| doc.id.as_str()).collect();
        let mut deleted = 0;

        for doc in original.iter().filter(|doc| !kept_ids.contains(doc.id.as_str())) {
            let path = self.ctx.content_path(&doc.file);
            let version = match self.store.get_file(&self.ctx, &path).await {
                Ok(file) => file.version,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(path = %path, error = %e, "cannot read removed document");
                    continue;
                }
            };
            let message = format!("Delete document: {}", doc.title);
            match self.store.delete_file(&self.ctx, &path, &version, &message).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(path = %path, error = %e, "cannot delete removed document"),
            }
        }
        deleted
    }

    async fn current_version(&self, path: &str) -> Result<Option<VersionToken>, StoreError> {
        match self.store.get_file(&self.ctx, path).await {
            Ok(file) => Ok(Some(file.version)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Shallow-merge two JSON objects, `local` keys overriding `remote` keys.
///
/// Returns `None` unless both inputs are JSON objects.
pub fn merge_json_objects(remote: &str, local: &str) -> Option<String> {
    let Ok(Value::Object(mut base)) = serde_json::from_str::<Value>(remote) else {
        return None;
    };
    let Ok(Value::Object(overrides)) = serde_json::from_str::<Value>(local) else {
        return None;
    };
    base.extend(overrides);
    serde_json::to_string_pretty(&Value::Object(base)).ok()
}
