use super::fetcher::FetchError;
use super::parser::ParsedList;
use crate::cache::CacheError;
use crate::source::{BlockSource, SourceError};
use serde::Serialize;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Lifecycle phase of the aggregation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Promoting,
    Aborting,
}

impl Phase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Running => 1,
            Phase::Promoting => 2,
            Phase::Aborting => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Running,
            2 => Phase::Promoting,
            3 => Phase::Aborting,
            _ => Phase::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Promoted,
    Aborted,
    /// Every source failed (or none is enabled); the live set was kept.
    NoSourcesSucceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub name: String,
    pub url: String,
    pub error: String,
}

/// Summary of one finished cycle, as logged and served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Unix timestamp (seconds) of the cycle start.
    pub started_at: u64,
    pub duration_ms: u64,
    pub sources_attempted: usize,
    pub sources_failed: usize,
    pub failures: Vec<SourceFailure>,
    /// Domains handed to the staging set, duplicates included.
    pub domains_staged: u64,
    /// Distinct domains in the promoted set.
    pub domains_added: u64,
    pub lines_dropped: u64,
    pub outcome: CycleOutcome,
    pub notified: bool,
}

/// Run state of the cycle in flight.
#[derive(Debug)]
pub struct RefreshCycle {
    started: Instant,
    started_at: u64,
    sources_attempted: usize,
    failures: Vec<SourceFailure>,
    domains_staged: u64,
    lines_dropped: u64,
}

impl RefreshCycle {
    pub fn start() -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            started: Instant::now(),
            started_at,
            sources_attempted: 0,
            failures: Vec::new(),
            domains_staged: 0,
            lines_dropped: 0,
        }
    }

    pub fn record_success(&mut self, parsed: &ParsedList) {
        self.sources_attempted += 1;
        self.domains_staged += parsed.domains.len() as u64;
        self.lines_dropped += parsed.dropped as u64;
    }

    pub fn record_failure(&mut self, source: &BlockSource, error: &FetchError) {
        self.sources_attempted += 1;
        self.failures.push(SourceFailure {
            name: source.name.clone(),
            url: source.url.clone(),
            error: error.to_string(),
        });
    }

    /// `false` when every attempted source failed, or none was attempted.
    pub fn any_succeeded(&self) -> bool {
        self.sources_attempted > self.failures.len()
    }

    pub fn finish(self, outcome: CycleOutcome, domains_added: u64, notified: bool) -> CycleReport {
        CycleReport {
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
            sources_attempted: self.sources_attempted,
            sources_failed: self.failures.len(),
            failures: self.failures,
            domains_staged: self.domains_staged,
            domains_added,
            lines_dropped: self.lines_dropped,
            outcome,
            notified,
        }
    }
}

/// Result of a refresh request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(CycleReport),
    /// Another cycle held the lock; this request was a no-op.
    AlreadyRunning,
}

/// Cycle-level failures. The live set is untouched in every case.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to list enabled sources: {0}")]
    Sources(#[from] SourceError),

    #[error("refresh aborted, cache backend failed: {source}")]
    Aborted {
        report: Box<CycleReport>,
        #[source]
        source: CacheError,
    },
}
