//! The remote store seam.
//!
//! The synchronizer and writer only talk to a [`RemoteStore`]: a flat,
//! content-addressed file store with conditional writes. Three backends
//! implement it:
//!
//! | Backend | Module | Version token |
//! |---------|--------|---------------|
//! | GitHub contents API | [`store_github`](crate::store_github) | blob `sha` |
//! | Local directory | [`store_fs`](crate::store_fs) | SHA-256 of content |
//! | In-process map | [`store_memory`](crate::store_memory) | SHA-256 of content |
//!
//! Every call receives the [`SyncContext`] it operates in, so one store
//! instance can serve several repositories and credentials.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::context::SyncContext;
use crate::error::StoreError;
use crate::models::{DirEntry, PutOptions, RemoteFile, VersionToken};
use crate::store_fs::FsStore;
use crate::store_github::GitHubStore;

/// A content-addressed remote file store with optimistic concurrency.
///
/// # Contract
///
/// - [`get_file`](RemoteStore::get_file) returns [`StoreError::NotFound`]
///   for absent paths; callers treat that as "empty".
/// - [`put_file`](RemoteStore::put_file) with `version: None` creates;
///   with `Some(token)` it overwrites only if the token still matches.
///   Mismatches return [`StoreError::Conflict`].
/// - [`list_directory`](RemoteStore::list_directory) lists one level.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short label used in logs and command output (e.g. `"github"`).
    fn kind(&self) -> &str;

    async fn get_file(&self, ctx: &SyncContext, path: &str) -> Result<RemoteFile, StoreError>;

    async fn put_file(
        &self,
        ctx: &SyncContext,
        path: &str,
        content: &str,
        opts: PutOptions,
    ) -> Result<VersionToken, StoreError>;

    async fn delete_file(
        &self,
        ctx: &SyncContext,
        path: &str,
        version: &VersionToken,
        message: &str,
    ) -> Result<(), StoreError>;

    async fn list_directory(&self, ctx: &SyncContext, path: &str)
        -> Result<Vec<DirEntry>, StoreError>;
}

/// Instantiate the backend named by `remote.backend`.
pub fn create_store(config: &Config) -> Result<Arc<dyn RemoteStore>> {
    let remote = &config.remote;
    match remote.backend.as_str() {
        "github" => Ok(Arc::new(GitHubStore::new(
            &remote.api_url,
            remote.timeout_secs,
        )?)),
        "filesystem" => {
            let root = remote
                .root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("remote.root required for filesystem backend"))?;
            Ok(Arc::new(FsStore::new(root)))
        }
        other => anyhow::bail!("Unknown remote backend: {}", other),
    }
}

/// Version token for hash-addressed backends: hex SHA-256 of the content.
pub fn content_version(content: &[u8]) -> VersionToken {
    let mut hasher = Sha256::new();
    hasher.update(content);
    VersionToken(hex::encode(hasher.finalize()))
}

/// Conditional-write check shared by the hash-addressed backends.
///
/// `current` is the token of what is stored now (`None` if absent).
pub fn check_version(
    path: &str,
    current: Option<&VersionToken>,
    expected: Option<&VersionToken>,
) -> Result<(), StoreError> {
    match (current, expected) {
        (None, None) => Ok(()),
        (Some(cur), Some(exp)) if cur == exp => Ok(()),
        (Some(cur), Some(exp)) => Err(StoreError::Conflict {
            path: path.to_string(),
            detail: format!("expected version {}, found {}", exp, cur),
        }),
        (Some(_), None) => Err(StoreError::Conflict {
            path: path.to_string(),
            detail: "file already exists; a version token is required".to_string(),
        }),
        (None, Some(exp)) => Err(StoreError::Conflict {
            path: path.to_string(),
            detail: format!("expected version {}, but the file is gone", exp),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_version_is_stable_hex() {
        let a = content_version(b"hello");
        assert_eq!(a, content_version(b"hello"));
        assert_ne!(a, content_version(b"hello!"));
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_check_version_matrix() {
        let v1 = VersionToken("v1".to_string());
        let v2 = VersionToken("v2".to_string());
        assert!(check_version("p", None, None).is_ok());
        assert!(check_version("p", Some(&v1), Some(&v1)).is_ok());
        assert!(check_version("p", Some(&v2), Some(&v1)).unwrap_err().is_conflict());
        assert!(check_version("p", Some(&v1), None).unwrap_err().is_conflict());
        assert!(check_version("p", None, Some(&v1)).unwrap_err().is_conflict());
    }
}
