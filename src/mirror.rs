//! Consumer-side copy of the live set.
//!
//! Reloads on every change notification and, because notifications are
//! best effort, also on a fixed polling interval. Lookups never wait for a
//! reload: the set is swapped in whole.

use crate::cache::{CacheClient, CacheError};
use arc_swap::ArcSwap;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

pub struct LiveSetMirror {
    cache: Arc<dyn CacheClient>,
    live_key: String,
    domains: ArcSwap<FxHashSet<Box<str>>>,
}

impl LiveSetMirror {
    pub fn new(cache: Arc<dyn CacheClient>, live_key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            live_key: live_key.into(),
            domains: ArcSwap::from_pointee(FxHashSet::default()),
        })
    }

    /// Exact match, case-insensitive, trailing root dot ignored.
    pub fn is_blocked(&self, domain: &str) -> bool {
        let name = domain.trim_end_matches('.').to_lowercase();
        self.domains.load().contains(name.as_str())
    }

    pub fn len(&self) -> usize {
        self.domains.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pulls the full live set and swaps it in. Returns the new size.
    pub async fn reload(&self) -> Result<usize, CacheError> {
        let members = self.cache.members(&self.live_key).await?;
        let set: FxHashSet<Box<str>> = members
            .into_iter()
            .map(|d| d.to_lowercase().into_boxed_str())
            .collect();
        let len = set.len();
        self.domains.store(Arc::new(set));
        info!("Blocklist mirror reloaded with {} domains", len);
        Ok(len)
    }

    /// Spawns the reload loop: one reload per notification on `channel` and
    /// one per `poll_interval` tick.
    pub fn spawn(self: &Arc<Self>, channel: String, poll_interval: Duration) -> JoinHandle<()> {
        let mirror = self.clone();
        tokio::spawn(async move {
            let mut updates = match mirror.cache.subscribe(&channel).await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    warn!(
                        "Failed to subscribe to '{}', falling back to polling: {}",
                        channel, e
                    );
                    None
                }
            };

            let mut ticker = time::interval(poll_interval);
            loop {
                tokio::select! {
                    msg = recv_update(&mut updates) => match msg {
                        Some(payload) => debug!("Received '{}' on '{}'", payload, channel),
                        None => {
                            warn!("Update channel '{}' closed, polling only", channel);
                            updates = None;
                            continue;
                        }
                    },
                    _ = ticker.tick() => {}
                }

                if let Err(e) = mirror.reload().await {
                    warn!("Blocklist mirror reload failed: {}", e);
                }
            }
        })
    }
}

async fn recv_update(updates: &mut Option<crate::cache::Subscription>) -> Option<String> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
