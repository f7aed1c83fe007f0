use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "http://www.elections.wa.gov.au";
pub const DEFAULT_COUNCIL_LIST_PATH: &str = "/elections/local/council-list/";
pub const DEFAULT_USER_AGENT: &str = "councilwatch/0.1";
pub const DEFAULT_DB_PATH: &str = "councilwatch.db";
pub const DEFAULT_CONFIG_PATH: &str = "councilwatch.toml";

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 250;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WatchConfig {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SourceSection {
    pub host: Option<String>,
    pub council_list_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub rate_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StoreSection {
    pub db_path: Option<String>,
}

impl WatchConfig {
    /// Resolve the source host: env COUNCILWATCH_HOST > config > default.
    /// Trailing slashes are stripped so paths can be appended directly.
    pub fn host(&self) -> String {
        let raw = env_value("COUNCILWATCH_HOST")
            .or_else(|| self.source.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        raw.trim_end_matches('/').to_string()
    }

    /// Resolve the council directory path: env > config > default.
    pub fn council_list_path(&self) -> String {
        env_value("COUNCILWATCH_COUNCIL_LIST_PATH")
            .or_else(|| self.source.council_list_path.clone())
            .unwrap_or_else(|| DEFAULT_COUNCIL_LIST_PATH.to_string())
    }

    /// Absolute URL of the council directory page.
    pub fn council_list_url(&self) -> String {
        let host = self.host();
        let path = self.council_list_path();
        if path.starts_with('/') {
            format!("{host}{path}")
        } else {
            format!("{host}/{path}")
        }
    }

    /// Resolve user agent: env COUNCILWATCH_USER_AGENT > config > default.
    pub fn user_agent(&self) -> String {
        env_value("COUNCILWATCH_USER_AGENT")
            .or_else(|| self.http.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_value_u64("COUNCILWATCH_HTTP_TIMEOUT_MS")
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        env_value_u64("COUNCILWATCH_HTTP_CONNECT_TIMEOUT_MS")
            .or(self.http.connect_timeout_ms)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS)
    }

    /// Retry budget for transient fetch failures.
    pub fn max_retries(&self) -> usize {
        env_value_usize("COUNCILWATCH_HTTP_RETRIES")
            .or(self.http.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Base delay for exponential backoff between retries.
    pub fn retry_delay_ms(&self) -> u64 {
        env_value_u64("COUNCILWATCH_HTTP_RETRY_DELAY_MS")
            .or(self.http.retry_delay_ms)
            .unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }

    /// Minimum gap between consecutive requests to the source host.
    pub fn rate_limit_ms(&self) -> u64 {
        env_value_u64("COUNCILWATCH_RATE_LIMIT_MS")
            .or(self.http.rate_limit_ms)
            .unwrap_or(DEFAULT_RATE_LIMIT_MS)
    }

    /// Resolve the store path: env COUNCILWATCH_DB_PATH > config > default.
    pub fn db_path(&self) -> PathBuf {
        let raw = env_value("COUNCILWATCH_DB_PATH")
            .or_else(|| self.store.db_path.clone())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        PathBuf::from(raw)
    }
}

/// Load and parse a WatchConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WatchConfig> {
    if !config_path.exists() {
        return Ok(WatchConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WatchConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Resolve the config file path: --config flag > COUNCILWATCH_CONFIG > default.
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(value) = env_value("COUNCILWATCH_CONFIG") {
        return PathBuf::from(value);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn env_value(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn env_value_u64(name: &str) -> Option<u64> {
    env_value(name).and_then(|value| value.parse().ok())
}

fn env_value_usize(name: &str) -> Option<usize> {
    env_value(name).and_then(|value| value.parse().ok())
}
