use crate::engine::{CycleOutcome, CycleReport, Phase};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::{self, Duration};
use tracing::info;

/// Refresh telemetry shared by the coordinator, the trigger queue and the API.
#[derive(Debug)]
pub struct RefreshStats {
    cycles_started: AtomicU64,
    cycles_promoted: AtomicU64,
    cycles_aborted: AtomicU64,
    // Cycles where every source failed, so nothing was promoted.
    cycles_without_sources: AtomicU64,
    // Refresh calls that found a cycle already holding the lock.
    refreshes_skipped: AtomicU64,
    // Triggers folded into a pending or running cycle by the queue.
    triggers_coalesced: AtomicU64,
    sources_failed: AtomicU64,
    phase: AtomicU8,
    last_report: RwLock<Option<CycleReport>>,
    last_error: RwLock<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub phase: Phase,
    pub in_progress: bool,
    pub cycles_started: u64,
    pub cycles_promoted: u64,
    pub cycles_aborted: u64,
    pub cycles_without_sources: u64,
    pub refreshes_skipped: u64,
    pub triggers_coalesced: u64,
    pub sources_failed: u64,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
}

impl RefreshStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cycles_started: AtomicU64::new(0),
            cycles_promoted: AtomicU64::new(0),
            cycles_aborted: AtomicU64::new(0),
            cycles_without_sources: AtomicU64::new(0),
            refreshes_skipped: AtomicU64::new(0),
            triggers_coalesced: AtomicU64::new(0),
            sources_failed: AtomicU64::new(0),
            phase: AtomicU8::new(Phase::Idle.as_u8()),
            last_report: RwLock::new(None),
            last_error: RwLock::new(None),
        })
    }

    /// Spawns a task that logs a stats line every `interval`.
    pub fn spawn_logger(self: &Arc<Self>, interval: Duration) {
        let stats = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // first tick is immediate and there is nothing to report yet
            ticker.tick().await;
            loop {
                ticker.tick().await;
                stats.dump_stats();
            }
        });
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.as_u8(), Ordering::SeqCst);
    }

    pub fn cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.set_phase(Phase::Running);
    }

    pub fn cycle_finished(&self, report: &CycleReport) {
        match report.outcome {
            CycleOutcome::Promoted => self.cycles_promoted.fetch_add(1, Ordering::Relaxed),
            CycleOutcome::Aborted => self.cycles_aborted.fetch_add(1, Ordering::Relaxed),
            CycleOutcome::NoSourcesSucceeded => {
                self.cycles_without_sources.fetch_add(1, Ordering::Relaxed)
            }
        };
        self.sources_failed
            .fetch_add(report.sources_failed as u64, Ordering::Relaxed);
        *self.last_report.write().unwrap() = Some(report.clone());
        match report.outcome {
            CycleOutcome::Promoted => *self.last_error.write().unwrap() = None,
            CycleOutcome::NoSourcesSucceeded => {
                *self.last_error.write().unwrap() = Some(format!(
                    "none of {} sources fetched successfully",
                    report.sources_attempted
                ))
            }
            CycleOutcome::Aborted => {}
        }
        self.set_phase(Phase::Idle);
    }

    /// Records a cycle that failed before it produced a report.
    pub fn cycle_failed(&self, error: &str) {
        self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write().unwrap() = Some(error.to_string());
        self.set_phase(Phase::Idle);
    }

    pub fn record_error(&self, error: &str) {
        *self.last_error.write().unwrap() = Some(error.to_string());
    }

    pub fn inc_skipped(&self) {
        self.refreshes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_coalesced(&self) {
        self.triggers_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> StatsSnapshot {
        let phase = self.phase();
        StatsSnapshot {
            phase,
            in_progress: phase != Phase::Idle,
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_promoted: self.cycles_promoted.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            cycles_without_sources: self.cycles_without_sources.load(Ordering::Relaxed),
            refreshes_skipped: self.refreshes_skipped.load(Ordering::Relaxed),
            triggers_coalesced: self.triggers_coalesced.load(Ordering::Relaxed),
            sources_failed: self.sources_failed.load(Ordering::Relaxed),
            last_report: self.last_report.read().unwrap().clone(),
            last_error: self.last_error.read().unwrap().clone(),
        }
    }

    fn dump_stats(&self) {
        let snapshot = self.get_snapshot();
        let last = match &snapshot.last_report {
            Some(report) => format!(
                "{:?} {} domains from {}/{} sources",
                report.outcome,
                report.domains_added,
                report.sources_attempted - report.sources_failed,
                report.sources_attempted
            ),
            None => "none".to_string(),
        };

        info!(
            "STATS DUMP: Cycles: {} (promoted {}, aborted {}, no sources {}), Skipped: {}, Coalesced: {}, SourceFailures: {}, Last: {}",
            snapshot.cycles_started,
            snapshot.cycles_promoted,
            snapshot.cycles_aborted,
            snapshot.cycles_without_sources,
            snapshot.refreshes_skipped,
            snapshot.triggers_coalesced,
            snapshot.sources_failed,
            last
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: CycleOutcome, failed: usize) -> CycleReport {
        CycleReport {
            started_at: 0,
            duration_ms: 5,
            sources_attempted: 2,
            sources_failed: failed,
            failures: vec![],
            domains_staged: 10,
            domains_added: 9,
            lines_dropped: 0,
            outcome,
            notified: outcome == CycleOutcome::Promoted,
        }
    }

    #[test]
    fn test_cycle_counters() {
        let stats = RefreshStats::new();
        stats.cycle_started();
        assert_eq!(stats.phase(), Phase::Running);
        stats.cycle_finished(&report(CycleOutcome::Promoted, 1));

        stats.cycle_started();
        stats.cycle_finished(&report(CycleOutcome::Aborted, 0));
        stats.inc_skipped();

        let snapshot = stats.get_snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.cycles_started, 2);
        assert_eq!(snapshot.cycles_promoted, 1);
        assert_eq!(snapshot.cycles_aborted, 1);
        assert_eq!(snapshot.refreshes_skipped, 1);
        assert_eq!(snapshot.sources_failed, 1);
        assert_eq!(
            snapshot.last_report.map(|r| r.outcome),
            Some(CycleOutcome::Aborted)
        );
    }

    #[test]
    fn test_successful_cycle_clears_last_error() {
        let stats = RefreshStats::new();
        stats.cycle_failed("source store unavailable");
        assert!(stats.get_snapshot().last_error.is_some());

        stats.cycle_started();
        stats.cycle_finished(&report(CycleOutcome::Promoted, 0));
        assert!(stats.get_snapshot().last_error.is_none());
    }

    #[test]
    fn test_cycle_without_sources_is_counted_separately() {
        let stats = RefreshStats::new();
        stats.cycle_started();
        let mut failed = report(CycleOutcome::NoSourcesSucceeded, 2);
        failed.domains_added = 0;
        stats.cycle_finished(&failed);

        let snapshot = stats.get_snapshot();
        assert_eq!(snapshot.cycles_without_sources, 1);
        assert_eq!(snapshot.cycles_promoted, 0);
        assert_eq!(snapshot.cycles_aborted, 0);
        assert!(!snapshot.in_progress);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("none of 2 sources fetched successfully")
        );
    }
}
