//! Process-local cache backend.
//!
//! Used when no Redis is configured and as the backing store in tests. Every
//! operation takes the map lock, so `rename` is observed atomically by
//! concurrent readers.

use super::types::{CacheClient, CacheError, Subscription};
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

pub struct MemoryCache {
    sets: RwLock<FxHashMap<String, Arc<FxHashSet<String>>>>,
    subscribers: Mutex<Vec<(String, mpsc::Sender<String>)>>,
    available: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(FxHashMap::default()),
            subscribers: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates the backend going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("memory cache offline".to_string()))
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn ping(&self) -> Result<(), CacheError> {
        self.check_available()
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_available()?;
        self.sets.write().unwrap().remove(key);
        Ok(())
    }

    async fn add_members(&self, key: &str, members: &[String]) -> Result<u64, CacheError> {
        self.check_available()?;
        let mut sets = self.sets.write().unwrap();
        let set = Arc::make_mut(sets.entry(key.to_string()).or_default());
        let added = members.iter().filter(|m| set.insert((*m).clone())).count();
        Ok(added as u64)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), CacheError> {
        self.check_available()?;
        let mut sets = self.sets.write().unwrap();
        let set = sets
            .remove(from)
            .ok_or_else(|| CacheError::command("RENAME", "no such key"))?;
        sets.insert(to.to_string(), set);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64, CacheError> {
        self.check_available()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        let delivered = subscribers
            .iter()
            .filter(|(name, _)| name == channel)
            .filter(|(_, tx)| tx.try_send(message.to_string()).is_ok())
            .count();
        Ok(delivered as u64)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.check_available()?;
        let set = self.sets.read().unwrap().get(key).cloned();
        Ok(set.map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn cardinality(&self, key: &str) -> Result<u64, CacheError> {
        self.check_available()?;
        let sets = self.sets.read().unwrap();
        Ok(sets.get(key).map_or(0, |s| s.len() as u64))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, CacheError> {
        self.check_available()?;
        let (tx, rx) = mpsc::channel(16);
        self.subscribers
            .lock()
            .unwrap()
            .push((channel.to_string(), tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_rename_replaces_destination() {
        let cache = MemoryCache::new();
        cache.add_members("live", &domains(&["old.com"])).await.unwrap();
        cache
            .add_members("temp", &domains(&["a.com", "b.com"]))
            .await
            .unwrap();

        cache.rename("temp", "live").await.unwrap();

        let mut live = cache.members("live").await.unwrap();
        live.sort();
        assert_eq!(live, domains(&["a.com", "b.com"]));
        assert_eq!(cache.cardinality("temp").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rename_missing_key_fails() {
        let cache = MemoryCache::new();
        assert!(cache.rename("missing", "live").await.is_err());
    }

    #[tokio::test]
    async fn test_add_members_counts_new_only() {
        let cache = MemoryCache::new();
        let added = cache
            .add_members("k", &domains(&["a.com", "a.com", "b.com"]))
            .await
            .unwrap();
        assert_eq!(added, 2);
    }

    #[tokio::test]
    async fn test_offline_cache_rejects_commands() {
        let cache = MemoryCache::new();
        cache.set_available(false);
        assert!(matches!(
            cache.delete("k").await,
            Err(CacheError::Unavailable(_))
        ));
        cache.set_available(true);
        assert!(cache.delete("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_reaches_channel_subscribers_only() {
        let cache = MemoryCache::new();
        let mut updates = cache.subscribe("updates").await.unwrap();
        let mut other = cache.subscribe("other").await.unwrap();

        let delivered = cache.publish("updates", "reload").await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(updates.recv().await.as_deref(), Some("reload"));
        assert!(other.try_recv().is_err());
    }
}
