//! Typed errors for remote store and catalog writer operations.
//!
//! Store errors are classified so callers can tell the recoverable cases
//! (`NotFound` is "empty", `Conflict` is "re-read and retry") apart from the
//! fatal ones. The writer wraps them into [`WriteError`], which is what
//! user-initiated uploads and edits surface.

use thiserror::Error;

/// Failure of a single [`RemoteStore`](crate::store::RemoteStore) call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path does not exist in the store.
    #[error("{path} not found")]
    NotFound { path: String },

    /// The version token supplied with a write no longer matches the stored
    /// content.
    #[error("version conflict on {path}: {detail}")]
    Conflict { path: String, detail: String },

    /// A write was attempted without a credential.
    #[error("no credential configured; {path} is read-only")]
    ReadOnly { path: String },

    /// The store answered with a non-success status (auth, payload size,
    /// rate limit, ...).
    #[error("remote store rejected {path} (HTTP {status}): {detail}")]
    Rejected {
        path: String,
        status: u16,
        detail: String,
    },

    /// The request never produced a response.
    #[error("network error on {path}: {detail}")]
    Network { path: String, detail: String },

    /// The store answered, but not in a shape we understand.
    #[error("malformed response for {path}: {detail}")]
    Malformed { path: String, detail: String },

    /// Local I/O failure in a filesystem-backed store.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Failure of a [`CatalogWriter`](crate::writer::CatalogWriter) operation.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Every attempt hit a version conflict.
    #[error("gave up writing {path} after {attempts} conflicting attempts: {detail}")]
    ConflictExhausted {
        path: String,
        attempts: u32,
        detail: String,
    },

    /// A non-conflict store failure; never retried.
    #[error("writing {path} failed: {source}")]
    Remote {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
