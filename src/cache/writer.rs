use super::types::{CacheClient, CacheError};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Writes one cycle's domains into the staging key and promotes it to the live key.
#[derive(Clone)]
pub struct CacheWriter {
    cache: Arc<dyn CacheClient>,
    live_key: String,
    staging_key: String,
    batch_size: usize,
}

impl CacheWriter {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        live_key: impl Into<String>,
        staging_key: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            cache,
            live_key: live_key.into(),
            staging_key: staging_key.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn live_key(&self) -> &str {
        &self.live_key
    }

    pub fn staging_key(&self) -> &str {
        &self.staging_key
    }

    /// Clears any leftover staging key and opens a fresh staging set.
    ///
    /// This is the first backend round-trip of a cycle, so an unreachable
    /// backend is detected here before any source is fetched.
    pub async fn begin(&self) -> Result<StagingSet<'_>, CacheError> {
        self.cache.delete(&self.staging_key).await?;
        Ok(StagingSet {
            writer: self,
            staged: 0,
            unique: 0,
            batches: 0,
        })
    }
}

/// Write-only accumulation target for one cycle.
///
/// Consumed by either `promote` or `discard`, so a staging set can be promoted
/// at most once.
pub struct StagingSet<'a> {
    writer: &'a CacheWriter,
    staged: u64,
    unique: u64,
    batches: u64,
}

/// Totals of a successful promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub staged: u64,
    pub unique: u64,
    pub batches: u64,
}

impl StagingSet<'_> {
    /// Appends domains in batches of at most `batch_size` members.
    pub async fn stage(&mut self, domains: &[String]) -> Result<u64, CacheError> {
        let mut added = 0;
        for batch in domains.chunks(self.writer.batch_size) {
            added += self
                .writer
                .cache
                .add_members(&self.writer.staging_key, batch)
                .await?;
            self.batches += 1;
        }
        self.staged += domains.len() as u64;
        self.unique += added;
        Ok(added)
    }

    pub fn staged(&self) -> u64 {
        self.staged
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Atomically swaps the staging set in as the live set.
    ///
    /// An empty staging set has no key to rename, so the live key is deleted
    /// instead, which readers observe as the empty set in one step.
    pub async fn promote(self) -> Result<Promotion, CacheError> {
        let cache = &self.writer.cache;
        let result = if self.unique == 0 {
            cache.delete(&self.writer.live_key).await
        } else {
            cache
                .rename(&self.writer.staging_key, &self.writer.live_key)
                .await
        };

        if let Err(e) = result {
            self.discard().await;
            return Err(e);
        }

        debug!(
            "Promoted '{}' -> '{}' ({} members, {} batches)",
            self.writer.staging_key, self.writer.live_key, self.unique, self.batches
        );
        Ok(Promotion {
            staged: self.staged,
            unique: self.unique,
            batches: self.batches,
        })
    }

    /// Drops the staging key. Best effort: the backend may be the reason we are here.
    pub async fn discard(self) {
        if let Err(e) = self.writer.cache.delete(&self.writer.staging_key).await {
            warn!(
                "Failed to discard staging set '{}': {}",
                self.writer.staging_key, e
            );
        }
    }
}
