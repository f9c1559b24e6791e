use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use blocksync::config::Config;
use blocksync::init::{init_aggregator, init_cache, setup_logging};
use blocksync::mirror::LiveSetMirror;
use blocksync::source::SourceRegistry;
use blocksync::stats::RefreshStats;
use blocksync::trigger::{RefreshQueue, RefreshWorker, TriggerReason};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("config.toml".to_string());
    let config_exists = std::path::Path::new(&config_path).exists();
    let config = if config_exists {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting blocksync...");
    if !config_exists {
        info!("Config file not found, using defaults.");
    }

    // 3. Init Stats
    let stats = RefreshStats::new();
    if config.stats.enable {
        stats.spawn_logger(Duration::from_secs(config.stats.log_interval_seconds));
    }

    // 4. Connect Cache Backend
    let cache = init_cache(&config).await?;

    // 5. Source Registry & Aggregator
    let registry = Arc::new(SourceRegistry::from_config(&config.sources));
    info!(
        "Loaded {} sources ({} enabled)",
        registry.all().len(),
        registry.all().iter().filter(|s| s.enabled).count()
    );
    let aggregator = Arc::new(init_aggregator(
        &config,
        cache.clone(),
        registry.clone(),
        stats.clone(),
    )?);

    // 6. Spawn Refresh Worker (scheduled + queued triggers)
    let (queue, rx) = RefreshQueue::new(config.updates.queue_capacity, stats.clone());
    let worker = RefreshWorker::new(aggregator, rx, config.updates.interval()).spawn();
    if config.updates.refresh_on_start {
        queue.submit(TriggerReason::Startup);
    }

    // 7. Optional Live-Set Mirror
    if config.mirror.enable {
        let mirror = LiveSetMirror::new(cache.clone(), config.cache.live_key.clone());
        mirror.spawn(
            config.cache.channel.clone(),
            Duration::from_secs(config.mirror.poll_interval_secs),
        );
    }

    // 8. Start API Server
    if config.api.enable {
        let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
            .parse()
            .context("Invalid API listen address")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind API server on {}", addr))?;
        let app = blocksync::api::router(stats.clone(), queue.clone(), registry.clone());

        tokio::spawn(async move {
            if let Err(e) = blocksync::api::serve(listener, app).await {
                error!("API server stopped: {}", e);
            }
        });
    }

    // 9. Graceful Shutdown
    tokio::select! {
        _ = worker => {
            error!("Refresh worker exited unexpectedly.");
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    Ok(())
}
