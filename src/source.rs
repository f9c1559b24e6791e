//! Block sources and the provider seam the coordinator reads them through.
//!
//! Source CRUD and its persistence live outside this crate. `SourceRegistry`
//! is the in-process stand-in, seeded from configuration and extended through
//! the API.

use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSource {
    pub id: u32,
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid source: {0}")]
    Invalid(String),
}

/// Read-only view of the configured sources.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Sources with `enabled = true`, in a stable order.
    async fn enabled_sources(&self) -> Result<Vec<BlockSource>, SourceError>;
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: RwLock<Vec<BlockSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[SourceConfig]) -> Self {
        let registry = Self::new();
        for source in configs {
            if let Err(e) = registry.add(&source.name, &source.url, source.enabled) {
                tracing::warn!("Skipping configured source '{}': {}", source.name, e);
            }
        }
        registry
    }

    /// Registers a new source and returns it with its assigned id.
    pub fn add(&self, name: &str, url: &str, enabled: bool) -> Result<BlockSource, SourceError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() {
            return Err(SourceError::Invalid("name must not be empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SourceError::Invalid(format!(
                "url must be http(s), got '{}'",
                url
            )));
        }

        let mut sources = self.sources.write().unwrap();
        let id = sources.iter().map(|s| s.id).max().map_or(1, |max| max + 1);
        let source = BlockSource {
            id,
            name: name.to_string(),
            url: url.to_string(),
            enabled,
        };
        sources.push(source.clone());
        Ok(source)
    }

    /// Returns `false` if no source has this id.
    pub fn set_enabled(&self, id: u32, enabled: bool) -> bool {
        let mut sources = self.sources.write().unwrap();
        match sources.iter_mut().find(|s| s.id == id) {
            Some(source) => {
                source.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn all(&self) -> Vec<BlockSource> {
        self.sources.read().unwrap().clone()
    }
}

#[async_trait]
impl SourceProvider for SourceRegistry {
    async fn enabled_sources(&self) -> Result<Vec<BlockSource>, SourceError> {
        let sources = self.sources.read().unwrap();
        Ok(sources.iter().filter(|s| s.enabled).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_returns_enabled_only() {
        let registry = SourceRegistry::new();
        registry.add("ads", "https://lists.example/ads.txt", true).unwrap();
        let off = registry
            .add("trackers", "https://lists.example/trackers.txt", true)
            .unwrap();
        assert!(registry.set_enabled(off.id, false));

        let enabled = registry.enabled_sources().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "ads");
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn test_registry_assigns_increasing_ids() {
        let registry = SourceRegistry::new();
        let a = registry.add("a", "http://a.example/list", true).unwrap();
        let b = registry.add("b", "http://b.example/list", false).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_registry_rejects_bad_input() {
        let registry = SourceRegistry::new();
        assert!(registry.add("", "https://a.example", true).is_err());
        assert!(registry.add("local", "file:///etc/hosts", true).is_err());
        assert!(!registry.set_enabled(42, true));
    }
}
