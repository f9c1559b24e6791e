//! Initialization helpers for the application startup.

use crate::cache::{CacheClient, CacheWriter, MemoryCache, RedisCache};
use crate::config::Config;
use crate::engine::{Aggregator, ReqwestFetcher};
use crate::notify::ChangeNotifier;
use crate::source::SourceProvider;
use crate::stats::RefreshStats;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = config.logging.level.clone();

        // Keep HTTP client internals quiet unless explicitly requested
        for noisy in ["hyper", "reqwest", "h2"] {
            if !filter.contains(noisy) {
                filter.push_str(&format!(",{}=warn", noisy));
            }
        }

        tracing_subscriber::EnvFilter::new(filter)
    });

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Connects the configured cache backend.
///
/// The initial Redis connection must succeed; afterwards the
/// `ConnectionManager` reconnects on its own.
pub async fn init_cache(config: &Config) -> Result<Arc<dyn CacheClient>> {
    match config.cache.backend.as_str() {
        "memory" => {
            info!("Using in-process memory cache backend.");
            Ok(Arc::new(MemoryCache::new()))
        }
        other => {
            if other != "redis" {
                warn!("Unknown cache backend '{}', defaulting to redis", other);
            }
            let cache = RedisCache::connect(&config.cache.redis_url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", config.cache.redis_url))?;
            if let Err(e) = cache.ping().await {
                warn!("Redis PING failed: {}", e);
            }
            Ok(Arc::new(cache))
        }
    }
}

/// Wires the aggregation pipeline from configuration.
pub fn init_aggregator(
    config: &Config,
    cache: Arc<dyn CacheClient>,
    sources: Arc<dyn SourceProvider>,
    stats: Arc<RefreshStats>,
) -> Result<Aggregator> {
    let fetcher = ReqwestFetcher::new(config.updates.fetch_settings())
        .context("Failed to build HTTP client")?;
    let writer = CacheWriter::new(
        cache.clone(),
        config.cache.live_key.clone(),
        config.cache.staging_key.clone(),
        config.cache.batch_size,
    );
    let notifier = ChangeNotifier::new(cache, config.cache.channel.clone());

    Ok(
        Aggregator::new(sources, Arc::new(fetcher), writer, notifier, stats)
            .with_concurrency(config.updates.concurrent_downloads),
    )
}
