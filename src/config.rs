//! TOML configuration.
//!
//! ```toml
//! [remote]
//! backend = "github"            # or "filesystem"
//! owner = "acme"
//! repo = "library"
//! branch = "main"
//! base_path = "docs/books"
//! # catalog_path = "docs/books/documents.json"
//! # token_env = "GITHUB_TOKEN"
//! # root = "./mirror"           # filesystem backend only
//!
//! [cache]
//! path = "./data/catalog-cache.json"
//! max_age_hours = 24
//!
//! [writer]
//! max_attempts = 3
//!
//! [access_log]
//! path = "./data/access-log.json"
//! capacity = 1000
//! ```

use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub access_log: AccessLogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub base_path: String,
    /// Defaults to `<base_path>/documents.json`.
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Store directory for the `filesystem` backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_content_globs")]
    pub content_globs: Vec<String>,
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

fn default_backend() -> String {
    "github".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_content_globs() -> Vec<String> {
    vec!["*.html".to_string()]
}
fn default_scan_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.max_age_hours).unwrap_or(chrono::Duration::MAX)
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/catalog-cache.json")
}
/// Ten years.
const MAX_CACHE_AGE_HOURS: i64 = 24 * 365 * 10;

fn default_max_age_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct WriterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccessLogConfig {
    #[serde(default = "default_access_log_path")]
    pub path: PathBuf,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            path: default_access_log_path(),
            capacity: default_capacity(),
            device_id: None,
        }
    }
}

fn default_access_log_path() -> PathBuf {
    PathBuf::from("./data/access-log.json")
}
fn default_capacity() -> usize {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let remote = &config.remote;

    match remote.backend.as_str() {
        "github" => {
            if remote.owner.as_deref().unwrap_or("").is_empty()
                || remote.repo.as_deref().unwrap_or("").is_empty()
            {
                anyhow::bail!("remote.owner and remote.repo are required for the github backend");
            }
        }
        "filesystem" => {
            if remote.root.is_none() {
                anyhow::bail!("remote.root is required for the filesystem backend");
            }
        }
        other => anyhow::bail!(
            "Unknown remote backend: '{}'. Must be github or filesystem.",
            other
        ),
    }

    if remote.branch.trim().is_empty() {
        anyhow::bail!("remote.branch must not be empty");
    }

    if remote.scan_concurrency == 0 {
        anyhow::bail!("remote.scan_concurrency must be >= 1");
    }

    if remote.content_globs.is_empty() {
        anyhow::bail!("remote.content_globs must name at least one pattern");
    }
    for pattern in &remote.content_globs {
        Glob::new(pattern).with_context(|| format!("Invalid content glob: '{}'", pattern))?;
    }

    if config.cache.max_age_hours <= 0 {
        anyhow::bail!("cache.max_age_hours must be > 0");
    }
    if config.cache.max_age_hours > MAX_CACHE_AGE_HOURS {
        anyhow::bail!(
            "cache.max_age_hours must be <= {} (ten years)",
            MAX_CACHE_AGE_HOURS
        );
    }

    if config.writer.max_attempts == 0 {
        anyhow::bail!("writer.max_attempts must be >= 1");
    }

    if config.access_log.capacity == 0 {
        anyhow::bail!("access_log.capacity must be >= 1");
    }

    Ok(())
}
