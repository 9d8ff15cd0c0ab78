use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::RetryPolicy;
use crate::paginate::DEFAULT_MAX_PAGES;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Origin of the catalogue; `freshUrl` is this plus the document's `staleUrl`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Any taxonomy key whose listing carries the reference facets.
    #[serde(default = "default_seed_key")]
    pub seed_key: String,
    #[serde(default = "default_collection_limit")]
    pub collection_limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on fragment pages fetched per document.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            seed_key: default_seed_key(),
            collection_limit: default_collection_limit(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.e-sbirka.cz".to_string()
}
fn default_api_prefix() -> String {
    "/sbr-cache".to_string()
}
fn default_seed_key() -> String {
    "196567".to_string()
}
fn default_collection_limit() -> usize {
    10_000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry forever, ignoring `max_retries`.
    #[serde(default)]
    pub unbounded: bool,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            unbounded: false,
            delay_secs: default_delay_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_delay_secs() -> u64 {
    10
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let max_retries = if self.unbounded {
            None
        } else {
            Some(self.max_retries)
        };
        RetryPolicy::new(max_retries, Duration::from_secs(self.delay_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

impl Config {
    /// Configuration with defaults everywhere except the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if reqwest::Url::parse(&config.api.base_url).is_err() {
        anyhow::bail!("api.base_url is not a valid URL: '{}'", config.api.base_url);
    }

    if !config.api.api_prefix.is_empty() && !config.api.api_prefix.starts_with('/') {
        anyhow::bail!("api.api_prefix must start with '/'");
    }

    if config.api.seed_key.trim().is_empty() {
        anyhow::bail!("api.seed_key must not be empty");
    }

    if config.api.collection_limit == 0 {
        anyhow::bail!("api.collection_limit must be > 0");
    }

    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }

    if config.api.max_pages == 0 {
        anyhow::bail!("api.max_pages must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.api.base_url, "https://www.e-sbirka.cz");
        assert_eq!(config.api.collection_limit, 10_000);
        assert_eq!(config.api.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.delay_secs, 10);
        assert!(!config.retry.unbounded);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unbounded_retry_has_no_ceiling() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[retry]\nunbounded = true\ndelay_secs = 1\n")
                .unwrap();
        let policy = config.retry.policy();
        assert_eq!(policy.max_retries(), None);
        assert_eq!(policy.delay(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_zero_limit() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[api]\ncollection_limit = 0\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("collection_limit"));
    }

    #[test]
    fn rejects_zero_page_cap() {
        let config: Config = toml::from_str("[db]\npath = \"x\"\n[api]\nmax_pages = 0\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("api.max_pages"));
    }

    #[test]
    fn rejects_bad_base_url() {
        let mut config = Config::with_db_path("x");
        config.api.base_url = "not a url".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/harvest.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
