//! In-process cache backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error};

use super::{glob_match, Cache};
use crate::{RelayError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// TTL-aware in-memory cache.
///
/// Expiry follows `tokio::time`, so paused test clocks apply. An expired
/// entry is removed when it is next read, and [`MemoryCache::run_purger`]
/// sweeps the ones nobody reads again.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

fn poisoned<T>(_: T) -> RelayError {
    RelayError::Cache("cache lock poisoned".to_string())
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    /// Purge expired entries every `period`. Never returns.
    pub async fn run_purger(&self, period: Duration) {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            match self.purge_expired() {
                Ok(0) => {}
                Ok(removed) => debug!("Purged {} expired cache entries", removed),
                Err(e) => error!("Failed to purge cache: {}", e),
            }
        }
    }

    /// Remove `key` if it is still expired at `now`.
    fn evict(&self, key: &str, now: Instant) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(())
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read().map_err(poisoned)?;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.evict(key, now)?;
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let removed = self.entries.write().map_err(poisoned)?.remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;

        let (current, expires_at) = match entries.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    RelayError::Cache(format!("value at {key} is not an integer"))
                })?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| RelayError::Cache(format!("increment overflow at {key}")))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<BTreeSet<String>> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();

        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites_value_and_ttl() {
        tokio::time::pause();
        let cache = MemoryCache::new();

        cache
            .set("k", "old", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        cache.set("k", "new", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        tokio::time::pause();
        let cache = MemoryCache::new();

        cache
            .set("k", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_missing_key_starts_at_one() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("counter").await.unwrap(), 1);
        assert_eq!(cache.increment("counter").await.unwrap(), 2);
        assert_eq!(cache.get("counter").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_increment_keeps_ttl() {
        tokio::time::pause();
        let cache = MemoryCache::new();

        cache
            .set("counter", "0", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(cache.increment("counter").await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cache.exists("counter").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_non_integer_fails() {
        let cache = MemoryCache::new();
        cache.set("k", "abc", None).await.unwrap();
        let result = cache.increment("k").await;
        assert!(matches!(result, Err(RelayError::Cache(_))));
    }

    #[tokio::test]
    async fn test_expire() {
        tokio::time::pause();
        let cache = MemoryCache::new();

        assert!(!cache.expire("missing", Duration::from_secs(1)).await.unwrap());

        cache.set("k", "v", None).await.unwrap();
        assert!(cache.expire("k", Duration::from_secs(1)).await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let cache = MemoryCache::new();
        cache.set("relay-email:a@x.y", "p1", None).await.unwrap();
        cache.set("relay-email:b@x.y", "p2", None).await.unwrap();
        cache.set("verification:code:p1", "123456", None).await.unwrap();

        let keys = cache.keys("relay-email:*").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("relay-email:a@x.y"));

        let all = cache.keys("*").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        tokio::time::pause();
        let cache = MemoryCache::new();

        cache
            .set("short", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache.set("long", "v", None).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
    }

    #[tokio::test]
    async fn test_read_evicts_expired_entry() {
        tokio::time::pause();
        let cache = MemoryCache::new();

        cache
            .set("k", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.len(), 0);

        cache
            .set("k2", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.exists("k2").await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purger_sweeps_unread_entries() {
        tokio::time::pause();
        let cache = std::sync::Arc::new(MemoryCache::new());
        cache
            .set("a", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache
            .set("b", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache.set("kept", "v", None).await.unwrap();

        let purger = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.run_purger(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cache.len(), 1);
        purger.abort();
    }
}
