//! In-memory storage backend implementation.
//!
//! A HashMap-backed [`KeyValueStore`] for tests, development and
//! single-instance deployments. State is lost on restart and is not shared
//! between processes, so multi-instance deployments need a shared backend
//! such as `RedisStore`.

use super::{KeyValueStore, StorageStats};
use crate::AuthError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Upper bound for expiries that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or(now + FAR_FUTURE)
}

/// Writes between automatic purges of expired entries.
const DEFAULT_CLEANUP_COUNT: u32 = 100;
/// Longest time between automatic purges while writes keep arriving.
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct Entries {
    map: HashMap<String, StoredValue>,
    writes_since_cleanup: u32,
    last_cleanup: Instant,
}

impl Entries {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            writes_since_cleanup: 0,
            last_cleanup: Instant::now(),
        }
    }

    fn purge(&mut self, now: Instant) -> usize {
        let initial_count = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        self.writes_since_cleanup = 0;
        self.last_cleanup = now;
        initial_count - self.map.len()
    }

    /// Counts one write and purges once either threshold is crossed.
    fn record_write(&mut self, now: Instant, thresholds: CleanupThresholds) {
        self.writes_since_cleanup = self.writes_since_cleanup.saturating_add(1);
        let due = self.writes_since_cleanup >= thresholds.count
            || now.duration_since(self.last_cleanup) >= thresholds.interval;
        if due {
            let removed = self.purge(now);
            if removed > 0 {
                tracing::debug!(removed, remaining = self.map.len(), "purged expired entries");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CleanupThresholds {
    count: u32,
    interval: Duration,
}

/// A simple in-memory store with per-key expiry.
///
/// This implementation keeps entries in a `HashMap` wrapped in
/// `Arc<RwLock<>>`. Expired entries are invisible to every operation as
/// soon as their deadline passes. They are physically removed when
/// overwritten, by [`MemoryStore::cleanup_expired`], or by an automatic
/// purge that runs inside a write once 100 writes have happened or 5
/// minutes have passed since the last purge (see
/// [`MemoryStore::with_cleanup_thresholds`]).
///
/// Atomic operations (`increment_with_ttl`, `set_if_absent_with_ttl`,
/// `compare_and_delete`) hold the write lock for their whole
/// read-modify-write.
///
/// # Example
///
/// ```rust
/// use phone_auth::storage::{KeyValueStore, MemoryStore};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), phone_auth::AuthError> {
/// let store = MemoryStore::new();
///
/// store.set("otp:+15551234567", "482913", Duration::from_secs(300)).await?;
/// assert_eq!(
///     store.get("otp:+15551234567").await?.as_deref(),
///     Some("482913")
/// );
///
/// assert!(store.set_if_absent_with_ttl("used:abc", "1", Duration::from_secs(60)).await?);
/// assert!(!store.set_if_absent_with_ttl("used:abc", "1", Duration::from_secs(60)).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<Entries>>,
    thresholds: CleanupThresholds,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with room for `capacity` keys before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(Entries::with_capacity(capacity))),
            thresholds: CleanupThresholds {
                count: DEFAULT_CLEANUP_COUNT,
                interval: DEFAULT_CLEANUP_INTERVAL,
            },
        }
    }

    /// Sets when writes purge expired entries: after `count_threshold`
    /// writes, or on the first write once `time_threshold` has passed since
    /// the last purge.
    ///
    /// ```
    /// use phone_auth::storage::MemoryStore;
    /// use std::time::Duration;
    ///
    /// // Purge every 1000 writes or every minute
    /// let store = MemoryStore::new().with_cleanup_thresholds(1000, Duration::from_secs(60));
    /// ```
    pub fn with_cleanup_thresholds(mut self, count_threshold: u32, time_threshold: Duration) -> Self {
        self.thresholds = CleanupThresholds {
            count: count_threshold.max(1),
            interval: time_threshold,
        };
        self
    }

    /// Physically removes expired entries and returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        self.data.write().await.purge(Instant::now())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let now = Instant::now();
        let data = self.data.read().await;
        Ok(data
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        data.record_write(now, self.thresholds);
        data.map
            .insert(key.to_string(), StoredValue::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AuthError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        data.record_write(now, self.thresholds);
        Ok(data.map.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        data.record_write(now, self.thresholds);

        let current = match data.map.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| {
                AuthError::from_storage_message(format!("Value at {key} is not an integer"))
            })?,
            None => 0,
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| AuthError::from_storage_message(format!("Counter at {key} overflowed")))?;
        data.map
            .insert(key.to_string(), StoredValue::new(next.to_string(), ttl));
        Ok(next)
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AuthError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        data.record_write(now, self.thresholds);
        if data.map.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        data.map
            .insert(key.to_string(), StoredValue::new(value.to_string(), ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, AuthError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        data.record_write(now, self.thresholds);
        if data
            .map
            .get(key)
            .is_some_and(|entry| entry.is_live(now) && entry.value == expected)
        {
            data.map.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn get_stats(&self) -> Result<StorageStats, AuthError> {
        let now = Instant::now();
        let data = self.data.read().await;
        let live = data.map.values().filter(|entry| entry.is_live(now)).count();
        Ok(StorageStats {
            total_keys: live,
            backend_info: format!(
                "In-memory HashMap store ({} live, {} expired pending cleanup)",
                live,
                data.map.len() - live
            ),
        })
    }
}
