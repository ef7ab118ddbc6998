//! Directory-backed [`RemoteStore`].
//!
//! Treats a local directory as the remote store: store paths map to files
//! under `root`, listings use `walkdir` one level deep, and version tokens
//! are SHA-256 content hashes. Useful for offline mirrors, shared network
//! drives, and end-to-end tests of the CLI.
//!
//! Conditional writes are serialized within the process; the
//! check-then-rename window is not protected against other processes. File
//! I/O runs on the blocking pool.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::cache::write_atomic;
use crate::context::SyncContext;
use crate::error::StoreError;
use crate::models::{DirEntry, EntryKind, PutOptions, RemoteFile, VersionToken};
use crate::store::{check_version, content_version, RemoteStore};

pub struct FsStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path into `root`, refusing anything that escapes it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(path.trim_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::Malformed {
                path: path.to_string(),
                detail: "store paths must be relative and must not contain '..'".to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl RemoteStore for FsStore {
    fn kind(&self) -> &str {
        "filesystem"
    }

    async fn get_file(&self, _ctx: &SyncContext, path: &str) -> Result<RemoteFile, StoreError> {
        let full = self.resolve(path)?;
        let owned = path.to_string();
        run_blocking(path, move || {
            if full.is_dir() {
                return Err(StoreError::NotFound { path: owned });
            }
            match read_current(&owned, &full)? {
                Some(content) => Ok(RemoteFile {
                    version: content_version(content.as_bytes()),
                    content,
                }),
                None => Err(StoreError::NotFound { path: owned }),
            }
        })
        .await
    }

    async fn put_file(
        &self,
        _ctx: &SyncContext,
        path: &str,
        content: &str,
        opts: PutOptions,
    ) -> Result<VersionToken, StoreError> {
        let full = self.resolve(path)?;
        let owned = path.to_string();
        let content = content.to_string();
        let _guard = self.write_lock.lock().await;

        run_blocking(path, move || {
            let current = read_current(&owned, &full)?.map(|c| content_version(c.as_bytes()));
            check_version(&owned, current.as_ref(), opts.version.as_ref())?;
            write_atomic(&full, content.as_bytes()).map_err(|e| io_error(&owned, e))?;
            Ok(content_version(content.as_bytes()))
        })
        .await
    }

    async fn delete_file(
        &self,
        _ctx: &SyncContext,
        path: &str,
        version: &VersionToken,
        _message: &str,
    ) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        let owned = path.to_string();
        let expected = version.clone();
        let _guard = self.write_lock.lock().await;

        run_blocking(path, move || {
            let current = match read_current(&owned, &full)? {
                Some(c) => content_version(c.as_bytes()),
                None => return Err(StoreError::NotFound { path: owned }),
            };
            check_version(&owned, Some(&current), Some(&expected))?;
            std::fs::remove_file(&full).map_err(|e| io_error(&owned, e))
        })
        .await
    }

    async fn list_directory(
        &self,
        _ctx: &SyncContext,
        path: &str,
    ) -> Result<Vec<DirEntry>, StoreError> {
        let full = self.resolve(path)?;
        let owned = path.to_string();
        run_blocking(path, move || list_one_level(&owned, &full)).await
    }
}

/// Run filesystem work on the blocking pool.
async fn run_blocking<T, F>(path: &str, work: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| io_error(path, std::io::Error::other(e)))?
}

fn read_current(path: &str, full: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(full) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

fn list_one_level(path: &str, full: &Path) -> Result<Vec<DirEntry>, StoreError> {
    if !full.is_dir() {
        return Err(StoreError::NotFound {
            path: path.to_string(),
        });
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(full)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| StoreError::Io {
            path: path.to_string(),
            source: e.into(),
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = entry.file_type();
        if file_type.is_dir() {
            entries.push(DirEntry {
                name,
                kind: EntryKind::Dir,
                size: None,
            });
        } else if file_type.is_file() {
            if name.ends_with(".tmp") {
                continue;
            }
            let size = entry.metadata().ok().map(|m| m.len());
            entries.push(DirEntry {
                name,
                kind: EntryKind::File,
                size,
            });
        }
    }
    Ok(entries)
}

fn io_error(path: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsStore, SyncContext) {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().to_path_buf());
        (tmp, store, SyncContext::new("", "", "main", "books"))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_creates_parents() {
        let (tmp, store, ctx) = setup();
        let v = store
            .put_file(
                &ctx,
                "books/a/x.html",
                "<p>x</p>",
                PutOptions {
                    message: "add".to_string(),
                    version: None,
                },
            )
            .await
            .unwrap();
        assert!(tmp.path().join("books/a/x.html").exists());

        let file = store.get_file(&ctx, "books/a/x.html").await.unwrap();
        assert_eq!(file.content, "<p>x</p>");
        assert_eq!(file.version, v);
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let (_tmp, store, ctx) = setup();
        let opts = |version| PutOptions {
            message: "m".to_string(),
            version,
        };
        let v1 = store.put_file(&ctx, "books/c.json", "[]", opts(None)).await.unwrap();
        store
            .put_file(&ctx, "books/c.json", "[1]", opts(Some(v1.clone())))
            .await
            .unwrap();
        let err = store
            .put_file(&ctx, "books/c.json", "[2]", opts(Some(v1)))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_listing_and_missing_paths() {
        let (tmp, store, ctx) = setup();
        std::fs::create_dir_all(tmp.path().join("books/b_author")).unwrap();
        std::fs::create_dir_all(tmp.path().join("books/a_author")).unwrap();
        std::fs::write(tmp.path().join("books/a_author/one.html"), "abc").unwrap();
        std::fs::write(tmp.path().join("books/documents.json"), "[]").unwrap();

        let root = store.list_directory(&ctx, "books").await.unwrap();
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a_author", "b_author", "documents.json"]);

        let files = store.list_directory(&ctx, "books/a_author").await.unwrap();
        assert_eq!(files[0].size, Some(3));

        assert!(store
            .list_directory(&ctx, "books/nope")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .get_file(&ctx, "books/nope.json")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_creates_are_serialized() {
        let (tmp, store, ctx) = setup();
        let store = std::sync::Arc::new(store);
        let create = |content: &'static str| {
            let store = store.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                store
                    .put_file(
                        &ctx,
                        "books/documents.json",
                        content,
                        PutOptions {
                            message: "create".to_string(),
                            version: None,
                        },
                    )
                    .await
            })
        };

        let (a, b) = tokio::join!(create("[1]"), create("[2]"));
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StoreError::Conflict { .. }))));

        let stored = std::fs::read_to_string(tmp.path().join("books/documents.json")).unwrap();
        assert!(stored == "[1]" || stored == "[2]");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_tmp, store, ctx) = setup();
        let err = store.get_file(&ctx, "../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
