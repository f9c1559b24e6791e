use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::engine::FetchSettings;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub updates: UpdateConfig,

    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// `redis` or `memory`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_live_key")]
    pub live_key: String,
    #[serde(default = "default_staging_key")]
    pub staging_key: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdateConfig {
    /// Scheduled refresh period; 0 disables the schedule.
    #[serde(default = "default_update_interval")]
    pub interval_hours: u64,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MirrorConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

// Defaults
fn default_true() -> bool {
    true
}
fn default_cache_backend() -> String {
    "redis".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379/".to_string()
}
fn default_live_key() -> String {
    "blocklist:global".to_string()
}
fn default_staging_key() -> String {
    "blocklist:global:temp".to_string()
}
fn default_channel() -> String {
    crate::notify::DEFAULT_CHANNEL.to_string()
}
fn default_batch_size() -> usize {
    crate::cache::DEFAULT_BATCH_SIZE
}
fn default_update_interval() -> u64 {
    24
}
fn default_concurrent_downloads() -> usize {
    crate::engine::DEFAULT_CONCURRENCY
}
fn default_request_timeout() -> u64 {
    10
}
fn default_fetch_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_queue_capacity() -> usize {
    16
}
fn default_api_host() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_log_interval() -> u64 {
    300
}
fn default_poll_interval() -> u64 {
    60
}
fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig {
        name: "stevenblack".to_string(),
        url: "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts".to_string(),
        enabled: true,
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            updates: UpdateConfig::default(),
            sources: default_sources(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
            mirror: MirrorConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis_url: default_redis_url(),
            live_key: default_live_key(),
            staging_key: default_staging_key(),
            channel: default_channel(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_update_interval(),
            concurrent_downloads: default_concurrent_downloads(),
            request_timeout_secs: default_request_timeout(),
            fetch_retries: default_fetch_retries(),
            retry_backoff_ms: default_retry_backoff(),
            queue_capacity: default_queue_capacity(),
            refresh_on_start: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable: true,
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enable: false,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl UpdateConfig {
    /// `None` when the periodic refresh is disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_hours > 0).then(|| Duration::from_secs(self.interval_hours * 3600))
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retries: self.fetch_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..FetchSettings::default()
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.cache.live_key, "blocklist:global");
        assert_eq!(config.cache.staging_key, "blocklist:global:temp");
        assert_eq!(config.cache.channel, "blocklist_update");
        assert_eq!(config.cache.batch_size, 1000);
        assert_eq!(config.updates.concurrent_downloads, 8);
        assert_eq!(config.updates.request_timeout_secs, 10);
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_sources_override_default_list() {
        let config = Config::parse(
            r#"
            [[sources]]
            name = "ads"
            url = "https://lists.example/ads.txt"

            [[sources]]
            name = "trackers"
            url = "https://lists.example/trackers.txt"
            enabled = false

            [updates]
            interval_hours = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].enabled);
        assert!(!config.sources[1].enabled);
        assert_eq!(config.updates.interval(), None);
        // untouched fields in a present section keep their defaults
        assert_eq!(config.updates.queue_capacity, 16);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("cache = 5").is_err());
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"[cache]\nbackend = \"memory\"\nbatch_size = 250\n",
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.cache.backend, "memory");
        assert_eq!(config.cache.batch_size, 250);
        assert_eq!(config.cache.live_key, "blocklist:global");
    }

    #[tokio::test]
    async fn test_load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path().join("absent.toml")).await.is_err());
    }
}
