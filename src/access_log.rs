//! Local document access log.
//!
//! Every document opened through `shelf show` is appended to a JSON file
//! holding the most recent `access_log.capacity` entries (oldest dropped).
//! The log never leaves the machine; `shelf stats` summarizes it.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::write_atomic;

/// Devices seen within this window count as active.
const ACTIVE_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    pub device_id: String,
    pub action: String,
    #[serde(default)]
    pub document: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AccessEntry {
    pub fn new(
        device_id: impl Into<String>,
        action: impl Into<String>,
        document: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            action: action.into(),
            document: document.into(),
            timestamp: Utc::now(),
            user_agent: Some(concat!("shelf-sync/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessLog {
    path: PathBuf,
    capacity: usize,
}

impl AccessLog {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
        }
    }

    /// All entries, oldest first. A missing or unreadable log is empty.
    pub fn load(&self) -> Vec<AccessEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt access log");
                Vec::new()
            }
        }
    }

    pub fn record(&self, entry: AccessEntry) -> Result<()> {
        let mut entries = self.load();
        entries.push(entry);
        cap_entries(&mut entries, self.capacity);
        let json = serde_json::to_vec(&entries).context("Failed to encode access log")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write access log: {}", self.path.display()))
    }
}

/// Drop the oldest entries beyond `capacity`.
pub fn cap_entries(entries: &mut Vec<AccessEntry>, capacity: usize) {
    if entries.len() > capacity {
        let excess = entries.len() - capacity;
        entries.drain(..excess);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentViews {
    pub document: String,
    pub views: usize,
    pub last_access: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessStats {
    pub total_access: usize,
    pub unique_devices: usize,
    pub active_devices: usize,
    pub last_access: Option<DateTime<Utc>>,
    /// Most viewed first.
    pub documents: Vec<DocumentViews>,
}

pub fn compute_stats(entries: &[AccessEntry], now: DateTime<Utc>) -> AccessStats {
    let active_since = now - Duration::minutes(ACTIVE_WINDOW_MINUTES);
    let unique_devices: HashSet<&str> = entries.iter().map(|e| e.device_id.as_str()).collect();
    let active_devices: HashSet<&str> = entries
        .iter()
        .filter(|e| e.timestamp > active_since)
        .map(|e| e.device_id.as_str())
        .collect();

    let mut by_document: BTreeMap<&str, DocumentViews> = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.document.is_empty()) {
        let stat = by_document
            .entry(entry.document.as_str())
            .or_insert_with(|| DocumentViews {
                document: entry.document.clone(),
                views: 0,
                last_access: entry.timestamp,
            });
        stat.views += 1;
        if entry.timestamp > stat.last_access {
            stat.last_access = entry.timestamp;
        }
    }
    let mut documents: Vec<DocumentViews> = by_document.into_values().collect();
    documents.sort_by(|a, b| b.views.cmp(&a.views));

    AccessStats {
        total_access: entries.len(),
        unique_devices: unique_devices.len(),
        active_devices: active_devices.len(),
        last_access: entries.last().map(|e| e.timestamp),
        documents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(device: &str, document: &str, minute: u32) -> AccessEntry {
        AccessEntry {
            device_id: device.to_string(),
            action: "open_document".to_string(),
            document: document.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            user_agent: None,
        }
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut entries: Vec<_> = (0..5).map(|m| entry("d", "x", m)).collect();
        cap_entries(&mut entries, 3);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].timestamp.format("%M").to_string(), "02");
    }

    #[test]
    fn test_record_respects_capacity() {
        let tmp = TempDir::new().unwrap();
        let log = AccessLog::new(tmp.path().join("log.json"), 2);
        for doc in ["a", "b", "c"] {
            log.record(AccessEntry::new("dev", "open_document", doc)).unwrap();
        }
        let entries = log.load();
        let docs: Vec<_> = entries.iter().map(|e| e.document.as_str()).collect();
        assert_eq!(docs, vec!["b", "c"]);
    }

    #[test]
    fn test_compute_stats() {
        let entries = vec![
            entry("d1", "A", 0),
            entry("d2", "B", 10),
            entry("d1", "B", 20),
            entry("d3", "", 21),
        ];
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 23, 0).unwrap();
        let stats = compute_stats(&entries, now);

        assert_eq!(stats.total_access, 4);
        assert_eq!(stats.unique_devices, 3);
        assert_eq!(stats.active_devices, 2);
        assert_eq!(stats.documents[0].document, "B");
        assert_eq!(stats.documents[0].views, 2);
        assert_eq!(stats.documents[0].last_access, entries[2].timestamp);
        assert_eq!(stats.documents.len(), 2);
    }
}
