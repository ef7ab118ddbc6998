//! In-memory [`RemoteStore`] for tests and embedding.
//!
//! Files live in a `BTreeMap` behind `std::sync::RwLock`; directories are
//! implied by path prefixes. Versions are content hashes, so the conditional
//! write rules match the filesystem backend exactly.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::context::SyncContext;
use crate::error::StoreError;
use crate::models::{DirEntry, EntryKind, PutOptions, RemoteFile, VersionToken};
use crate::store::{check_version, content_version, RemoteStore};

pub struct MemoryStore {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seed a file unconditionally.
    pub fn insert(&self, path: &str, content: impl Into<String>) {
        self.files
            .write()
            .unwrap()
            .insert(path.trim_matches('/').to_string(), content.into());
    }

    /// Current content of `path`, if any.
    pub fn read(&self, path: &str) -> Option<String> {
        self.files.read().unwrap().get(path.trim_matches('/')).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.read().unwrap().keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn get_file(&self, _ctx: &SyncContext, path: &str) -> Result<RemoteFile, StoreError> {
        let key = path.trim_matches('/');
        let files = self.files.read().unwrap();
        match files.get(key) {
            Some(content) => Ok(RemoteFile {
                content: content.clone(),
                version: content_version(content.as_bytes()),
            }),
            None => Err(StoreError::NotFound {
                path: key.to_string(),
            }),
        }
    }

    async fn put_file(
        &self,
        _ctx: &SyncContext,
        path: &str,
        content: &str,
        opts: PutOptions,
    ) -> Result<VersionToken, StoreError> {
        let key = path.trim_matches('/');
        let mut files = self.files.write().unwrap();
        let current = files.get(key).map(|c| content_version(c.as_bytes()));
        check_version(key, current.as_ref(), opts.version.as_ref())?;
        files.insert(key.to_string(), content.to_string());
        Ok(content_version(content.as_bytes()))
    }

    async fn delete_file(
        &self,
        _ctx: &SyncContext,
        path: &str,
        version: &VersionToken,
        _message: &str,
    ) -> Result<(), StoreError> {
        let key = path.trim_matches('/');
        let mut files = self.files.write().unwrap();
        let current = match files.get(key) {
            Some(c) => content_version(c.as_bytes()),
            None => {
                return Err(StoreError::NotFound {
                    path: key.to_string(),
                })
            }
        };
        check_version(key, Some(&current), Some(version))?;
        files.remove(key);
        Ok(())
    }

    async fn list_directory(
        &self,
        _ctx: &SyncContext,
        path: &str,
    ) -> Result<Vec<DirEntry>, StoreError> {
        let dir = path.trim_matches('/');
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let files = self.files.read().unwrap();
        let mut entries: BTreeMap<String, DirEntry> = BTreeMap::new();
        for (key, content) in files.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    entries.entry(child.to_string()).or_insert(DirEntry {
                        name: child.to_string(),
                        kind: EntryKind::Dir,
                        size: None,
                    });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        DirEntry {
                            name: rest.to_string(),
                            kind: EntryKind::File,
                            size: Some(content.len() as u64),
                        },
                    );
                }
            }
        }

        if entries.is_empty() && !dir.is_empty() {
            return Err(StoreError::NotFound {
                path: dir.to_string(),
            });
        }
        Ok(entries.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SyncContext {
        SyncContext::new("o", "r", "main", "base")
    }

    fn create() -> PutOptions {
        PutOptions {
            message: "test".to_string(),
            version: None,
        }
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let store = MemoryStore::new();
        let ctx = ctx();

        let v1 = store.put_file(&ctx, "base/a.json", "1", create()).await.unwrap();
        // creating again without a token conflicts
        let err = store.put_file(&ctx, "base/a.json", "2", create()).await.unwrap_err();
        assert!(err.is_conflict());

        let v2 = store
            .put_file(
                &ctx,
                "base/a.json",
                "2",
                PutOptions {
                    message: "update".to_string(),
                    version: Some(v1.clone()),
                },
            )
            .await
            .unwrap();
        assert_ne!(v1, v2);

        // stale token
        let err = store
            .put_file(
                &ctx,
                "base/a.json",
                "3",
                PutOptions {
                    message: "stale".to_string(),
                    version: Some(v1),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.read("base/a.json").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_list_directory_one_level() {
        let store = MemoryStore::new();
        store.insert("base/documents.json", "[]");
        store.insert("base/a/one.html", "1");
        store.insert("base/a/two.html", "22");
        store.insert("base/b/deep/three.html", "3");
        store.insert("based/x.html", "not under base");
        let ctx = ctx();

        let root = store.list_directory(&ctx, "base").await.unwrap();
        let names: Vec<_> = root.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("a", EntryKind::Dir),
                ("b", EntryKind::Dir),
                ("documents.json", EntryKind::File)
            ]
        );

        let a = store.list_directory(&ctx, "base/a").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].size, Some(2));

        let err = store.list_directory(&ctx, "base/missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_requires_current_version() {
        let store = MemoryStore::new();
        let ctx = ctx();
        store.insert("base/a/x.html", "x");
        let file = store.get_file(&ctx, "base/a/x.html").await.unwrap();

        let stale = VersionToken("nope".to_string());
        assert!(store
            .delete_file(&ctx, "base/a/x.html", &stale, "rm")
            .await
            .unwrap_err()
            .is_conflict());
        store
            .delete_file(&ctx, "base/a/x.html", &file.version, "rm")
            .await
            .unwrap();
        assert!(store
            .get_file(&ctx, "base/a/x.html")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
