use super::cycle::{CycleOutcome, CycleReport, Phase, RefreshCycle, RefreshError, RefreshOutcome};
use super::parser::{parse_list, ParsedList};
use super::traits::SourceFetcher;
use super::fetcher::FetchError;
use crate::cache::{CacheError, CacheWriter};
use crate::notify::ChangeNotifier;
use crate::source::{BlockSource, SourceProvider};
use crate::stats::RefreshStats;
use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Owns the refresh lifecycle: enumerate sources, fetch and parse them
/// concurrently, stage the results, promote, notify.
///
/// The single-writer lock belongs to the instance, so independent aggregators
/// (for example one per cache) never contend with each other.
pub struct Aggregator {
    sources: Arc<dyn SourceProvider>,
    fetcher: Arc<dyn SourceFetcher>,
    writer: CacheWriter,
    notifier: ChangeNotifier,
    stats: Arc<RefreshStats>,
    concurrency: usize,
    lock: Mutex<()>,
}

impl Aggregator {
    pub fn new(
        sources: Arc<dyn SourceProvider>,
        fetcher: Arc<dyn SourceFetcher>,
        writer: CacheWriter,
        notifier: ChangeNotifier,
        stats: Arc<RefreshStats>,
    ) -> Self {
        Self {
            sources,
            fetcher,
            writer,
            notifier,
            stats,
            concurrency: DEFAULT_CONCURRENCY,
            lock: Mutex::new(()),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn stats(&self) -> &Arc<RefreshStats> {
        &self.stats
    }

    /// Observes the published phase; never touches the refresh lock.
    pub fn is_running(&self) -> bool {
        self.stats.phase() != Phase::Idle
    }

    /// Runs one cycle unless one is already in flight.
    ///
    /// A concurrent call returns `AlreadyRunning` immediately instead of
    /// queueing a second run. Per-source fetch failures are folded into the
    /// report; only cache backend failures (and failing to list sources)
    /// surface as errors, and in those cases the live set is left as it was.
    /// A cycle in which no source succeeded is not promoted either.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        let Ok(_guard) = self.lock.try_lock() else {
            info!("Blocklist refresh already in progress, ignoring request");
            self.stats.inc_skipped();
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        self.stats.cycle_started();
        let result = self.run_cycle().await;
        match &result {
            Ok(report) => self.stats.cycle_finished(report),
            Err(RefreshError::Aborted { report, source }) => {
                self.stats.cycle_finished(report);
                self.stats.record_error(&source.to_string());
            }
            Err(e) => self.stats.cycle_failed(&e.to_string()),
        }
        result.map(RefreshOutcome::Completed)
    }

    async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        let mut cycle = RefreshCycle::start();
        let sources = self.sources.enabled_sources().await.map_err(|e| {
            error!("Failed to list enabled sources: {}", e);
            e
        })?;
        info!("Refreshing blocklists from {} enabled sources...", sources.len());

        let mut staging = match self.writer.begin().await {
            Ok(staging) => staging,
            Err(e) => return Err(self.abort(cycle, e)),
        };

        let fetcher = self.fetcher.clone();
        let tasks = sources.into_iter().map(|source| {
            let fetcher = fetcher.clone();
            async move {
                let result = fetch_and_parse(fetcher.as_ref(), &source).await;
                (source, result)
            }
        });
        let mut results = stream::iter(tasks).buffer_unordered(self.concurrency);

        // Sources are staged one at a time as their fetch completes, so writes
        // into the staging set never interleave.
        while let Some((source, result)) = results.next().await {
            match result {
                Ok(parsed) => {
                    info!(
                        "Parsed {} domains from '{}' (ID {}), dropped {} lines",
                        parsed.domains.len(),
                        source.name,
                        source.id,
                        parsed.dropped
                    );
                    if let Err(e) = staging.stage(&parsed.domains).await {
                        drop(results);
                        staging.discard().await;
                        return Err(self.abort(cycle, e));
                    }
                    cycle.record_success(&parsed);
                }
                Err(e) => {
                    warn!("Failed to fetch '{}' from {}: {}", source.name, source.url, e);
                    cycle.record_failure(&source, &e);
                }
            }
        }

        if !cycle.any_succeeded() {
            self.stats.set_phase(Phase::Aborting);
            staging.discard().await;
            let report = cycle.finish(CycleOutcome::NoSourcesSucceeded, 0, false);
            warn!(
                target: "refresh_cycle",
                attempted = report.sources_attempted,
                failed = report.sources_failed,
                "No source fetched successfully, keeping the current live set"
            );
            return Ok(report);
        }

        self.stats.set_phase(Phase::Promoting);
        let promotion = match staging.promote().await {
            Ok(promotion) => promotion,
            Err(e) => return Err(self.abort(cycle, e)),
        };

        let notified = self.notifier.notify().await;
        let report = cycle.finish(CycleOutcome::Promoted, promotion.unique, notified);
        info!(
            target: "refresh_cycle",
            attempted = report.sources_attempted,
            failed = report.sources_failed,
            staged = report.domains_staged,
            added = report.domains_added,
            batches = promotion.batches,
            duration_ms = report.duration_ms,
            "Blocklist refresh complete. {} distinct domains from {} sources ({} failed)",
            report.domains_added,
            report.sources_attempted,
            report.sources_failed
        );
        Ok(report)
    }

    fn abort(&self, cycle: RefreshCycle, source: CacheError) -> RefreshError {
        self.stats.set_phase(Phase::Aborting);
        let report = cycle.finish(CycleOutcome::Aborted, 0, false);
        error!(
            target: "refresh_cycle",
            attempted = report.sources_attempted,
            failed = report.sources_failed,
            "Blocklist refresh aborted, live set untouched: {}",
            source
        );
        RefreshError::Aborted {
            report: Box::new(report),
            source,
        }
    }
}

async fn fetch_and_parse(
    fetcher: &dyn SourceFetcher,
    source: &BlockSource,
) -> Result<ParsedList, FetchError> {
    info!(
        "Fetching blocklist '{}' (ID {}) from {}",
        source.name, source.id, source.url
    );
    let body = fetcher.fetch(&source.url).await?;
    Ok(parse_list(&String::from_utf8_lossy(&body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheClient, MemoryCache};
    use crate::engine::fetcher::FailureKind;
    use crate::source::SourceRegistry;
    use std::collections::HashMap;

    struct StaticFetcher {
        bodies: HashMap<String, &'static str>,
    }

    #[async_trait::async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.bodies
                .get(url)
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| FetchError::new(FailureKind::HttpStatus(404), "not found"))
        }
    }

    fn aggregator(cache: Arc<MemoryCache>, registry: SourceRegistry) -> Aggregator {
        let mut bodies = HashMap::new();
        bodies.insert("http://lists.test/hosts".to_string(), "0.0.0.0 ads.test\n");
        bodies.insert("http://lists.test/plain".to_string(), "# plain\ntracker.test\n");
        bodies.insert("http://lists.test/empty".to_string(), "# nothing listed yet\n");
        Aggregator::new(
            Arc::new(registry),
            Arc::new(StaticFetcher { bodies }),
            CacheWriter::new(cache.clone(), "live", "temp", 1000),
            ChangeNotifier::new(cache, "updates"),
            RefreshStats::new(),
        )
    }

    #[tokio::test]
    async fn test_refresh_merges_sources() {
        let cache = Arc::new(MemoryCache::new());
        let registry = SourceRegistry::new();
        registry.add("hosts", "http://lists.test/hosts", true).unwrap();
        registry.add("plain", "http://lists.test/plain", true).unwrap();
        registry.add("off", "http://lists.test/missing", false).unwrap();

        let outcome = aggregator(cache.clone(), registry).refresh().await.unwrap();

        let RefreshOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.sources_attempted, 2);
        assert_eq!(report.sources_failed, 0);
        assert!(report.notified);
        let mut live = cache.members("live").await.unwrap();
        live.sort();
        assert_eq!(live, vec!["ads.test", "tracker.test"]);
    }

    #[tokio::test]
    async fn test_unreachable_cache_aborts_before_fetching() {
        let cache = Arc::new(MemoryCache::new());
        cache.set_available(false);
        let registry = SourceRegistry::new();
        registry.add("hosts", "http://lists.test/hosts", true).unwrap();
        let aggregator = aggregator(cache, registry);

        let err = aggregator.refresh().await.unwrap_err();

        match err {
            RefreshError::Aborted { report, .. } => {
                assert_eq!(report.outcome, CycleOutcome::Aborted);
                assert_eq!(report.sources_attempted, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!aggregator.is_running());
        assert_eq!(aggregator.stats().phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_no_enabled_sources_keeps_live_set() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .add_members("live", &["kept.test".to_string()])
            .await
            .unwrap();
        let mut updates = cache.subscribe("updates").await.unwrap();

        let outcome = aggregator(cache.clone(), SourceRegistry::new())
            .refresh()
            .await
            .unwrap();

        let RefreshOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.outcome, CycleOutcome::NoSourcesSucceeded);
        assert!(!report.notified);
        assert_eq!(cache.members("live").await.unwrap(), vec!["kept.test"]);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_successful_source_clears_live_set() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .add_members("live", &["stale.test".to_string()])
            .await
            .unwrap();
        let registry = SourceRegistry::new();
        registry.add("empty", "http://lists.test/empty", true).unwrap();

        let outcome = aggregator(cache.clone(), registry).refresh().await.unwrap();

        let RefreshOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.outcome, CycleOutcome::Promoted);
        assert_eq!(cache.cardinality("live").await.unwrap(), 0);
    }
}
