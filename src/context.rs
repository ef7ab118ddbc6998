//! Per-call repository context.
//!
//! A [`SyncContext`] names the repository, branch, and base path every store
//! call operates on, and carries the optional credential attached to each
//! request. It is built once from configuration and passed explicitly; no
//! store reads ambient state.

use std::fmt;

use crate::config::RemoteConfig;

/// Opaque access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone)]
pub struct SyncContext {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory holding author folders and (by default) the catalog file.
    pub base_path: String,
    catalog_path: String,
    credential: Option<Credential>,
}

impl SyncContext {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        let base_path = normalize(&base_path.into());
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            catalog_path: join_path(&base_path, "documents.json"),
            base_path,
            credential: None,
        }
    }

    /// Build from the `[remote]` config section, reading the token from the
    /// environment variable it names.
    pub fn from_config(remote: &RemoteConfig) -> Self {
        let mut ctx = Self::new(
            remote.owner.clone().unwrap_or_default(),
            remote.repo.clone().unwrap_or_default(),
            remote.branch.clone(),
            remote.base_path.clone(),
        );
        if let Some(ref path) = remote.catalog_path {
            ctx = ctx.with_catalog_path(path);
        }
        if let Ok(token) = std::env::var(&remote.token_env) {
            if !token.trim().is_empty() {
                ctx = ctx.with_credential(Credential::new(token.trim()));
            }
        }
        ctx
    }

    pub fn with_catalog_path(mut self, path: &str) -> Self {
        self.catalog_path = normalize(path);
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.credential.is_none()
    }

    pub fn catalog_path(&self) -> &str {
        &self.catalog_path
    }

    /// Store path of an author folder.
    pub fn author_dir(&self, author_slug: &str) -> String {
        join_path(&self.base_path, author_slug)
    }

    /// Store path of a record's content blob (`file` is base-relative).
    pub fn content_path(&self, file: &str) -> String {
        join_path(&self.base_path, file)
    }

    /// Short human label, e.g. `"owner/repo@main"`.
    pub fn label(&self) -> String {
        if self.owner.is_empty() && self.repo.is_empty() {
            format!("@{}", self.branch)
        } else {
            format!("{}/{}@{}", self.owner, self.repo, self.branch)
        }
    }
}

/// Join two store paths with exactly one `/`, tolerating empty segments.
pub fn join_path(base: &str, rel: &str) -> String {
    let base = base.trim_matches('/');
    let rel = rel.trim_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, rel),
    }
}

fn normalize(path: &str) -> String {
    path.trim().trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_base() {
        let ctx = SyncContext::new("o", "r", "main", "/docs/Quyet/");
        assert_eq!(ctx.base_path, "docs/Quyet");
        assert_eq!(ctx.catalog_path(), "docs/Quyet/documents.json");
        assert_eq!(ctx.author_dir("a"), "docs/Quyet/a");
        assert_eq!(ctx.content_path("a/b.html"), "docs/Quyet/a/b.html");
        assert_eq!(ctx.label(), "o/r@main");
    }

    #[test]
    fn test_empty_base_path_is_repo_root() {
        let ctx = SyncContext::new("o", "r", "main", "");
        assert_eq!(ctx.catalog_path(), "documents.json");
        assert_eq!(ctx.content_path("a/b.html"), "a/b.html");

        let ctx = ctx.with_catalog_path("/meta/documents.json");
        assert_eq!(ctx.catalog_path(), "meta/documents.json");
    }

    #[test]
    fn test_credential_is_redacted() {
        let ctx = SyncContext::new("o", "r", "main", "").with_credential(Credential::new("s3cret"));
        assert!(!ctx.is_read_only());
        assert!(!format!("{:?}", ctx).contains("s3cret"));
        assert_eq!(ctx.credential().map(Credential::expose), Some("s3cret"));
    }
}
