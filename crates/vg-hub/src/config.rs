//! Hub configuration, loaded from an optional TOML file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Deserialize, Default, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QuerySettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Limits and defaults applied by the query engine.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct QuerySettings {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    /// Preset window used when a request names no window at all.
    #[serde(default = "default_since_minutes")]
    pub default_since_minutes: i64,
    #[serde(default = "default_live_batch_limit")]
    pub live_batch_limit: i64,
    #[serde(default = "default_max_live_batch")]
    pub max_live_batch: i64,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl QuerySettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_since_minutes: default_since_minutes(),
            live_batch_limit: default_live_batch_limit(),
            max_live_batch: default_max_live_batch(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}
fn default_page_size() -> i64 {
    50
}
fn default_max_page_size() -> i64 {
    500
}
fn default_since_minutes() -> i64 {
    60
}
fn default_live_batch_limit() -> i64 {
    100
}
fn default_max_live_batch() -> i64 {
    1000
}
fn default_store_timeout_ms() -> u64 {
    2000
}

impl Config {
    /// Read `path` if it exists. A missing or malformed file yields defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Malformed config {:?}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }
}
