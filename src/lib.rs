//! # Shelf Sync
//!
//! Catalog synchronization for a document reader that uses a GitHub
//! repository as its file store.
//!
//! The reader keeps a catalog (`documents.json`) of the documents stored
//! under author folders in the repository. This crate reconciles a local
//! cache of that catalog with the remote file and a scan of the folders,
//! and writes catalog changes back with optimistic concurrency so that
//! concurrent writers never silently overwrite each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │ CatalogCache │──▶│ CatalogSynchronizer │──▶│ watch channel │──▶ reader
//! └──────────────┘   └──────────┬──────────┘   └──────────────┘
//!                               │ get / list
//!                    ┌──────────▼──────────┐
//!                    │     RemoteStore     │  GitHub · filesystem · memory
//!                    └──────────▲──────────┘
//!                               │ get / put(version token)
//!                    ┌──────────┴──────────┐
//!                    │    CatalogWriter    │◀── upload / replace / pin
//!                    └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf sync                                  # reconcile and cache the catalog
//! shelf list                                  # print the cached catalog
//! shelf upload book.html --author "Nguyễn Nhật Ánh"
//! shelf pin <id>
//! shelf show <id>
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Catalog records and store value types |
//! | [`error`] | Typed store and writer errors |
//! | [`context`] | Per-call repository context and credential |
//! | [`slug`] | Slugs, display names, document ids |
//! | [`catalog`] | Dedup, merge, change detection, catalog codec |
//! | [`store`] | The `RemoteStore` trait and backend factory |
//! | [`store_github`] | GitHub contents API backend |
//! | [`store_fs`] | Local directory backend |
//! | [`store_memory`] | In-memory backend |
//! | [`cache`] | Local catalog cache file |
//! | [`sync`] | The catalog synchronizer |
//! | [`writer`] | Optimistic-concurrency catalog writer |
//! | [`metadata`] | Metadata header of content blobs |
//! | [`access_log`] | Local access log and statistics |
//! | [`progress`] | Sync progress reporting |
//! | [`get`] | Document retrieval (`shelf show`) |
//! | [`upload`] | Catalog-mutating commands |
//! | [`stats`] | Local statistics (`shelf stats`) |

pub mod access_log;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod get;
pub mod metadata;
pub mod models;
pub mod progress;
pub mod slug;
pub mod stats;
pub mod store;
pub mod store_fs;
pub mod store_github;
pub mod store_memory;
pub mod sync;
pub mod upload;
pub mod writer;
