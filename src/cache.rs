//! Local catalog cache persistence.
//!
//! The cache is a single JSON file holding a [`CatalogCache`]. It is always
//! replaced whole: the new snapshot is written to a sibling temp file and
//! renamed over the old one, so readers never observe a partial cache.
//!
//! A cache that is missing or cannot be parsed is treated as absent; the
//! next successful sync rewrites it.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::models::CatalogCache;

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<CatalogCache> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read catalog cache");
                return None;
            }
        };
        match serde_json::from_str::<CatalogCache>(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt catalog cache");
                None
            }
        }
    }

    pub fn save(&self, cache: &CatalogCache) -> Result<()> {
        let json = serde_json::to_vec_pretty(cache).context("Failed to encode catalog cache")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write catalog cache: {}", self.path.display()))
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory.
///
/// Parent directories are created as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}
