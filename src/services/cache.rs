//! In-process TTL cache shared by the balance, price and token-list lookups.
//!
//! Values are stored as JSON so one store can hold any serde type. A value
//! that fails to (de)serialize is logged and treated as a miss.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::{interval, Instant};

use crate::errors::CustomError;

pub const BALANCE_TTL_SECS: u64 = 120;
pub const PRICE_TTL_SECS: u64 = 60;
pub const TOKEN_LIST_TTL_SECS: u64 = 3600;
pub const DEFAULT_STALE_GRACE_SECS: u64 = 600;

const MIN_PRUNE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    stale_grace: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_STALE_GRACE_SECS))
    }
}

impl ResponseCache {
    pub fn new(stale_grace: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            stale_grace,
        }
    }

    /// Returns the value if present and not yet expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = {
            let entry = self.entries.get(key)?;
            if Instant::now() >= entry.expires_at {
                debug!("Cache EXPIRED for key: {}", key);
                return None;
            }
            entry.value.clone()
        };
        debug!("Cache HIT for key: {}", key);
        self.decode(key, value)
    }

    /// Returns the value even if its TTL has passed, as long as the pruner
    /// has not removed it yet.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.entries.get(key)?.value.clone();
        self.decode(key, value)
    }

    /// A TTL too large to place on the clock skips the write.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            warn!("Not caching key {}: TTL of {}s is out of range", key, ttl.as_secs());
            return;
        };
        match serde_json::to_value(value) {
            Ok(value) => {
                self.entries
                    .insert(key.to_string(), CacheEntry { value, expires_at });
                debug!("Cache SET for key: {} with TTL: {}s", key, ttl.as_secs());
            }
            Err(e) => warn!("Failed to serialize value for cache key {}: {}", key, e),
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries whose TTL plus the stale grace period has passed.
    /// Returns the number of entries removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry
                .expires_at
                .checked_add(self.stale_grace)
                .map_or(true, |deadline| deadline > now)
        });
        before.saturating_sub(self.entries.len())
    }

    /// Spawns the periodic sweep on the current tokio runtime. Periods below
    /// one second are raised to one second.
    pub fn spawn_pruner(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        let every = every.max(MIN_PRUNE_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let removed = cache.prune_expired();
                if removed > 0 {
                    info!("Pruned {} expired cache entries, {} remain", removed, cache.len());
                }
            }
        })
    }

    /// An entry that no longer decodes is dropped and treated as a miss.
    fn decode<T: DeserializeOwned>(&self, key: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                let err = CustomError::CacheError(format!("key {}: {}", key, e));
                warn!("{}", err);
                self.remove(key);
                None
            }
        }
    }
}
