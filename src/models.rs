//! Core data models shared by the store, synchronizer, and writer.
//!
//! [`DocumentRecord`] is the wire shape of one entry in the remote catalog
//! file (`documents.json`) and of the local cache. Field names are camelCase
//! on the wire so catalogs written by other clients round-trip unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Content blob path, relative to the base path.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
    /// UI hint for freshly uploaded documents. Never written to the cache.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
    /// Fields this crate does not model, kept so other writers' data survives.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        author_slug: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            author_slug: author_slug.into(),
            description: None,
            file: file.into(),
            file_size: None,
            created_at: None,
            updated_at: None,
            pinned: false,
            is_new: false,
            extra: Map::new(),
        }
    }

    /// Deduplication key: `authorSlug/file`.
    ///
    /// Catalog files are stored author-relative (`<authorSlug>/<name>.html`),
    /// so the author segment is not repeated when `file` already carries it.
    pub fn identity_key(&self) -> String {
        let file = self.file.trim_start_matches('/');
        if self.author_slug.is_empty() {
            return file.to_string();
        }
        let prefix = format!("{}/", self.author_slug);
        if file.starts_with(&prefix) {
            file.to_string()
        } else {
            format!("{}{}", prefix, file)
        }
    }

    /// Apply `incoming` on top of `self`, the way an explicit upsert edits a
    /// record instance: incoming fields win, absent optional fields keep the
    /// stored value, unknown fields are merged.
    pub fn overlay(&mut self, incoming: DocumentRecord) {
        let DocumentRecord {
            id,
            title,
            author,
            author_slug,
            description,
            file,
            file_size,
            created_at,
            updated_at,
            pinned,
            is_new,
            extra,
        } = incoming;

        self.id = id;
        self.title = title;
        self.author = author;
        self.author_slug = author_slug;
        if description.is_some() {
            self.description = description;
        }
        self.file = file;
        if file_size.is_some() {
            self.file_size = file_size;
        }
        if created_at.is_some() {
            self.created_at = created_at;
        }
        if updated_at.is_some() {
            self.updated_at = updated_at;
        }
        self.pinned = pinned;
        self.is_new = is_new;
        self.extra.extend(extra);
    }

    /// Stamp a mutation: `updatedAt = now`, and `createdAt = now` if missing.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }
}

/// Locally persisted snapshot of the last reconciled catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCache {
    pub last_sync: DateTime<Utc>,
    pub documents: Vec<DocumentRecord>,
}

impl CatalogCache {
    /// Build a cache snapshot, dropping transient UI flags.
    pub fn new(documents: &[DocumentRecord], last_sync: DateTime<Utc>) -> Self {
        let documents = documents
            .iter()
            .cloned()
            .map(|mut doc| {
                doc.is_new = false;
                doc
            })
            .collect();
        Self {
            last_sync,
            documents,
        }
    }

    /// Whether the snapshot is young enough to serve before reconciling.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_sync) < max_age
    }
}

/// Opaque optimistic-concurrency token (a content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// File content plus the token required to overwrite it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub content: String,
    pub version: VersionToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

/// Options for a conditional write.
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// Commit message (ignored by stores without history).
    pub message: String,
    /// Token read before the write; `None` means "create".
    pub version: Option<VersionToken>,
}

/// Serde adapter for catalog timestamps.
///
/// Writes ISO-8601 with millisecond precision. Reads leniently: anything
/// that is not a parseable RFC 3339 string becomes `None` instead of failing
/// the whole record.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}
