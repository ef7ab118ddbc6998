//! Catalog algebra: dedup, merge, change detection, and the catalog codec.
//!
//! Everything here is pure. The synchronizer and writer compose these
//! functions around store calls.
//!
//! # Identity
//!
//! Records are matched by [`DocumentRecord::identity_key`], never by `id`:
//! two independently created records pointing at the same blob are the same
//! document.
//!
//! # Decode contract
//!
//! [`decode_catalog`] never fails. A catalog that is not a JSON array decodes
//! to an empty list (with a warning); entries that are not valid records are
//! skipped (with a warning).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::models::{DirEntry, DocumentRecord};
use crate::slug::{document_id, file_stem, filename_to_title, slug_to_name};

/// Keep the first record for every identity key, preserving order.
pub fn dedup(records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|doc| seen.insert(doc.identity_key()))
        .collect()
}

/// Append every `discovered` record whose identity is not yet present.
///
/// `local` is returned unchanged as a prefix of the result; new records are
/// appended in discovery order.
pub fn merge(local: &[DocumentRecord], discovered: &[DocumentRecord]) -> Vec<DocumentRecord> {
    let mut merged = local.to_vec();
    let mut keys: HashSet<String> = local.iter().map(DocumentRecord::identity_key).collect();
    for doc in discovered {
        if keys.insert(doc.identity_key()) {
            merged.push(doc.clone());
        }
    }
    merged
}

/// Whether two catalogs differ as identity sets (order-independent).
pub fn has_changed(old: &[DocumentRecord], new: &[DocumentRecord]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let old_keys: HashSet<String> = old.iter().map(DocumentRecord::identity_key).collect();
    let new_keys: HashSet<String> = new.iter().map(DocumentRecord::identity_key).collect();
    old_keys != new_keys
}

/// Decode a remote catalog file, failing closed.
pub fn decode_catalog(content: &str) -> Vec<DocumentRecord> {
    let value: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "catalog is not valid JSON; treating as empty");
            return Vec::new();
        }
    };

    let Value::Array(entries) = value else {
        warn!(kind = json_kind(&value), "catalog is not a JSON array; treating as empty");
        return Vec::new();
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<DocumentRecord>(entry) {
            Ok(doc) => records.push(doc),
            Err(e) => warn!(index, error = %e, "skipping malformed catalog entry"),
        }
    }
    records
}

/// Encode a catalog the way it is stored remotely: pretty, 2-space indent.
pub fn encode_catalog(records: &[DocumentRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

/// Stable sort with pinned records first.
pub fn sort_pinned_first(records: &mut [DocumentRecord]) {
    records.sort_by_key(|doc| !doc.pinned);
}

/// Insert `record` or replace the entry with the same `id`.
///
/// Returns `true` if an existing entry was replaced.
pub fn upsert_by_id(records: &mut Vec<DocumentRecord>, record: DocumentRecord) -> bool {
    match records.iter_mut().find(|doc| doc.id == record.id) {
        Some(existing) => {
            existing.overlay(record);
            true
        }
        None => {
            records.push(record);
            false
        }
    }
}

/// Synthesize a record for a content file found by the discovery scan.
pub fn discovered_record(author_slug: &str, entry: &DirEntry, now: DateTime<Utc>) -> DocumentRecord {
    let stem = file_stem(&entry.name);
    let mut doc = DocumentRecord::new(
        document_id(author_slug, stem, now),
        filename_to_title(&entry.name),
        slug_to_name(author_slug),
        author_slug,
        format!("{}/{}", author_slug, entry.name),
    );
    doc.file_size = entry.size;
    doc.created_at = Some(now);
    doc.updated_at = Some(now);
    doc
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
