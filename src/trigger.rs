//! Fire-and-forget refresh triggers.
//!
//! Request handlers never run a cycle themselves. They submit a trigger to a
//! bounded queue and return at once; a single worker task drains the queue
//! and drives the aggregator. Triggers that arrive while a cycle is running
//! are folded into it rather than producing another run.

use crate::engine::{Aggregator, RefreshOutcome};
use crate::stats::RefreshStats;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    Startup,
    Scheduled,
    Manual,
    SourceCreated(String),
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Startup => write!(f, "startup"),
            TriggerReason::Scheduled => write!(f, "scheduled"),
            TriggerReason::Manual => write!(f, "manual"),
            TriggerReason::SourceCreated(name) => write!(f, "source '{}' created", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    Accepted,
    /// The queue was full: a refresh is already pending and will cover this one.
    Coalesced,
}

#[derive(Clone)]
pub struct RefreshQueue {
    tx: mpsc::Sender<TriggerReason>,
    stats: Arc<RefreshStats>,
}

impl RefreshQueue {
    pub fn new(capacity: usize, stats: Arc<RefreshStats>) -> (Self, mpsc::Receiver<TriggerReason>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, rx)
    }

    /// Never waits.
    pub fn submit(&self, reason: TriggerReason) -> Submission {
        match self.tx.try_send(reason) {
            Ok(()) => Submission::Accepted,
            Err(TrySendError::Full(reason)) => {
                debug!("Refresh queue full, folding trigger ({})", reason);
                self.stats.inc_coalesced();
                Submission::Coalesced
            }
            Err(TrySendError::Closed(reason)) => {
                warn!("Refresh worker is gone, dropping trigger ({})", reason);
                Submission::Coalesced
            }
        }
    }

    /// Number of triggers waiting for the worker.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

pub struct RefreshWorker {
    aggregator: Arc<Aggregator>,
    rx: mpsc::Receiver<TriggerReason>,
    interval: Option<Duration>,
}

impl RefreshWorker {
    pub fn new(
        aggregator: Arc<Aggregator>,
        rx: mpsc::Receiver<TriggerReason>,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            aggregator,
            rx,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every `RefreshQueue` handle has been dropped.
    pub async fn run(mut self) {
        let mut ticker = self.interval.map(|period| {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker
        });
        // The first tick completes immediately
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        loop {
            let reason = tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(reason) => reason,
                    None => {
                        info!("Refresh queue closed, worker stopping");
                        break;
                    }
                },
                _ = next_tick(&mut ticker) => TriggerReason::Scheduled,
            };

            info!("Blocklist refresh triggered ({})", reason);
            if let Some(ticker) = ticker.as_mut() {
                // Reset timer to avoid a double update
                ticker.reset();
            }
            self.run_cycle().await;
            self.drain_pending();
        }
    }

    async fn run_cycle(&self) {
        match self.aggregator.refresh().await {
            Ok(RefreshOutcome::Completed(report)) => {
                debug!("Cycle finished in {}ms", report.duration_ms)
            }
            Ok(RefreshOutcome::AlreadyRunning) => {
                debug!("Another caller is refreshing, trigger folded into it")
            }
            Err(e) => error!("Blocklist refresh failed: {}", e),
        }
    }

    fn drain_pending(&mut self) {
        let mut folded = 0;
        while let Ok(reason) = self.rx.try_recv() {
            debug!("Folding trigger ({}) into the finished cycle", reason);
            self.aggregator.stats().inc_coalesced();
            folded += 1;
        }
        if folded > 0 {
            info!("{} triggers arrived during the cycle and were folded into it", folded);
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
