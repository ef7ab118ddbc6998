//! GitHub contents API backend.
//!
//! Uses the repository contents REST API as a flat file store:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | get | `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}` |
//! | put | `PUT /repos/{owner}/{repo}/contents/{path}` with `{message, content, branch, sha?}` |
//! | delete | `DELETE /repos/{owner}/{repo}/contents/{path}` with `{message, sha, branch}` |
//! | list | `GET /repos/{owner}/{repo}/contents/{dir}?ref={branch}` |
//!
//! Content travels base64-encoded; the blob `sha` is the version token.
//! Files above the API's inline limit come back without content and are
//! fetched through their `download_url`.
//!
//! # Authentication
//!
//! The credential from the [`SyncContext`] is sent as
//! `Authorization: token <credential>`. Without one, reads still work on
//! public repositories and every write fails with
//! [`StoreError::ReadOnly`] before a request is made.
//!
//! # Status mapping
//!
//! | HTTP | Error |
//! |------|-------|
//! | 404 | [`StoreError::NotFound`] |
//! | 409, or 422 mentioning `sha` | [`StoreError::Conflict`] |
//! | other non-2xx | [`StoreError::Rejected`] |
//! | no response | [`StoreError::Network`] |

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::context::SyncContext;
use crate::error::StoreError;
use crate::models::{DirEntry, EntryKind, PutOptions, RemoteFile, VersionToken};
use crate::store::RemoteStore;

const ACCEPT: &str = "application/vnd.github.v3+json";

pub struct GitHubStore {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubStore {
    pub fn new(api_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("shelf-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn contents_url(&self, ctx: &SyncContext, path: &str) -> String {
        let encoded = encode_path(path);
        let base = format!(
            "{}/repos/{}/{}/contents",
            self.api_url,
            uri_encode(&ctx.owner),
            uri_encode(&ctx.repo)
        );
        if encoded.is_empty() {
            base
        } else {
            format!("{}/{}", base, encoded)
        }
    }

    fn request(&self, ctx: &SyncContext, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, url).header("Accept", ACCEPT);
        if let Some(credential) = ctx.credential() {
            builder = builder.header("Authorization", format!("token {}", credential.expose()));
        }
        builder
    }

    fn require_credential(ctx: &SyncContext, path: &str) -> Result<(), StoreError> {
        if ctx.is_read_only() {
            return Err(StoreError::ReadOnly {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder.send().await.map_err(|e| network(path, e))?;
        let status = response.status();
        debug!(path, status = status.as_u16(), "github response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(path, status, &body))
    }

    async fn download(
        &self,
        ctx: &SyncContext,
        path: &str,
        url: &str,
    ) -> Result<String, StoreError> {
        let mut builder = self.client.get(url);
        if let Some(credential) = ctx.credential() {
            builder = builder.header("Authorization", format!("token {}", credential.expose()));
        }
        let response = self.send(path, builder).await?;
        response.text().await.map_err(|e| network(path, e))
    }
}

// ============ Wire types ============

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct ListingItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl RemoteStore for GitHubStore {
    fn kind(&self) -> &str {
        "github"
    }

    async fn get_file(&self, ctx: &SyncContext, path: &str) -> Result<RemoteFile, StoreError> {
        let url = self.contents_url(ctx, path);
        let builder = self
            .request(ctx, Method::GET, &url)
            .query(&[("ref", ctx.branch.as_str())]);
        let response = self.send(path, builder).await?;
        let body = response.text().await.map_err(|e| network(path, e))?;

        let meta: ContentResponse = serde_json::from_str(&body).map_err(|e| StoreError::Malformed {
            path: path.to_string(),
            detail: format!("expected a file object: {}", e),
        })?;

        let content = match (meta.encoding.as_deref(), meta.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_content(path, encoded)?,
            _ => match meta.download_url.as_deref() {
                Some(url) => self.download(ctx, path, url).await?,
                None => {
                    return Err(StoreError::Malformed {
                        path: path.to_string(),
                        detail: "response carries neither inline content nor a download_url"
                            .to_string(),
                    })
                }
            },
        };

        Ok(RemoteFile {
            content,
            version: VersionToken(meta.sha),
        })
    }

    async fn put_file(
        &self,
        ctx: &SyncContext,
        path: &str,
        content: &str,
        opts: PutOptions,
    ) -> Result<VersionToken, StoreError> {
        Self::require_credential(ctx, path)?;

        let mut body = serde_json::json!({
            "message": opts.message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": ctx.branch,
        });
        if let Some(version) = opts.version {
            body["sha"] = serde_json::Value::String(version.0);
        }

        let url = self.contents_url(ctx, path);
        let response = self
            .send(path, self.request(ctx, Method::PUT, &url).json(&body))
            .await?;
        let parsed: PutResponse = response.json().await.map_err(|e| StoreError::Malformed {
            path: path.to_string(),
            detail: e.to_string(),
        })?;
        Ok(VersionToken(parsed.content.sha))
    }

    async fn delete_file(
        &self,
        ctx: &SyncContext,
        path: &str,
        version: &VersionToken,
        message: &str,
    ) -> Result<(), StoreError> {
        Self::require_credential(ctx, path)?;

        let body = serde_json::json!({
            "message": message,
            "sha": version.as_str(),
            "branch": ctx.branch,
        });
        let url = self.contents_url(ctx, path);
        self.send(path, self.request(ctx, Method::DELETE, &url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_directory(
        &self,
        ctx: &SyncContext,
        path: &str,
    ) -> Result<Vec<DirEntry>, StoreError> {
        let url = self.contents_url(ctx, path);
        let builder = self
            .request(ctx, Method::GET, &url)
            .query(&[("ref", ctx.branch.as_str())]);
        let response = self.send(path, builder).await?;
        let body = response.text().await.map_err(|e| network(path, e))?;

        let items: Vec<ListingItem> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed {
                path: path.to_string(),
                detail: format!("expected a directory listing: {}", e),
            })?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    // symlinks and submodules are not catalog content
                    _ => return None,
                };
                Some(DirEntry {
                    name: item.name,
                    kind,
                    size: match kind {
                        EntryKind::File => item.size,
                        EntryKind::Dir => None,
                    },
                })
            })
            .collect())
    }
}

// ============ Helpers ============

fn decode_content(path: &str, encoded: &str) -> Result<String, StoreError> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| StoreError::Malformed {
            path: path.to_string(),
            detail: format!("invalid base64 content: {}", e),
        })?;
    String::from_utf8(bytes).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        detail: format!("content is not UTF-8: {}", e),
    })
}

fn classify(path: &str, status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<ApiError>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            path: path.to_string(),
        },
        StatusCode::CONFLICT => StoreError::Conflict {
            path: path.to_string(),
            detail: message,
        },
        StatusCode::UNPROCESSABLE_ENTITY if message.to_lowercase().contains("sha") => {
            StoreError::Conflict {
                path: path.to_string(),
                detail: message,
            }
        }
        _ => StoreError::Rejected {
            path: path.to_string(),
            status: status.as_u16(),
            detail: message,
        },
    }
}

fn network(path: &str, e: reqwest::Error) -> StoreError {
    StoreError::Network {
        path: path.to_string(),
        detail: e.to_string(),
    }
}

/// Percent-encode each segment of a store path, keeping the `/` separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// RFC 3986 unreserved characters pass through; everything else is `%XX`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("/docs/Quyet/a b/x.html"), "docs/Quyet/a%20b/x.html");
        assert_eq!(encode_path(""), "");
        assert_eq!(encode_path("tôi"), "t%C3%B4i");
    }

    #[test]
    fn test_decode_content_ignores_line_breaks() {
        // the API wraps base64 at 60 columns
        let encoded = "PHA+aGVs\nbG88L3A+\n";
        assert_eq!(decode_content("p", encoded).unwrap(), "<p>hello</p>");
        assert!(decode_content("p", "!!!").is_err());
    }

    #[test]
    fn test_classify_statuses() {
        assert!(classify("p", StatusCode::NOT_FOUND, "").is_not_found());
        assert!(classify("p", StatusCode::CONFLICT, r#"{"message":"x"}"#).is_conflict());
        assert!(classify(
            "p",
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#
        )
        .is_conflict());

        match classify("p", StatusCode::UNAUTHORIZED, r#"{"message":"Bad credentials"}"#) {
            StoreError::Rejected { status, detail, .. } => {
                assert_eq!(status, 401);
                assert_eq!(detail, "Bad credentials");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match classify("p", StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":"too large"}"#) {
            StoreError::Rejected { status, .. } => assert_eq!(status, 422),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_contents_url() {
        let store = GitHubStore::new("https://api.github.com/", 5).unwrap();
        let ctx = SyncContext::new("acme", "library", "main", "docs");
        assert_eq!(
            store.contents_url(&ctx, "docs/documents.json"),
            "https://api.github.com/repos/acme/library/contents/docs/documents.json"
        );
        assert_eq!(
            store.contents_url(&ctx, ""),
            "https://api.github.com/repos/acme/library/contents"
        );
    }
}
