//! Pluggable key-value backends for ephemeral auth state.
//!
//! Every cross-request invariant in this crate (single-use refresh tokens,
//! OTP attempt caps, throttling) is expressed as operations on a
//! [`KeyValueStore`]. Backends must provide the atomic primitives
//! themselves; the core never takes a process-local lock, so several service
//! instances can share one store.

use crate::AuthError;
use async_trait::async_trait;
use std::time::Duration;

// Always available
mod memory;
pub use memory::MemoryStore;

// Feature-gated storage backends
#[cfg(feature = "redis-storage")]
mod redis;
#[cfg(feature = "redis-storage")]
pub use redis::RedisStore;

/// Statistics about the key-value backend.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Number of live keys visible to this backend
    pub total_keys: usize,
    /// Additional backend-specific information
    pub backend_info: String,
}

/// Abstract key-value store with per-key expiry.
///
/// # Available Implementations
///
/// - [`MemoryStore`] - Always available, in-process HashMap with lazy expiry
/// - `RedisStore` - Available with `redis-storage` feature, shared Redis state
///
/// # Atomicity
///
/// `increment_with_ttl`, `set_if_absent_with_ttl` and `compare_and_delete`
/// must be atomic with respect to concurrent callers, including callers in
/// other processes when the backend is shared. The refresh-token single-use guarantee rests on
/// `set_if_absent_with_ttl` returning `true` to exactly one caller.
///
/// # Error Handling
///
/// Backend failures are reported as [`AuthError::Unexpected`], usually via
/// [`AuthError::from_storage_message`]. A missing key is not an error.
///
/// # Example Implementation
///
/// ```rust
/// use phone_auth::storage::{KeyValueStore, StorageStats};
/// use phone_auth::AuthError;
/// use async_trait::async_trait;
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use tokio::sync::Mutex;
///
/// #[derive(Default)]
/// pub struct NoExpiryStore {
///     data: Mutex<HashMap<String, String>>,
/// }
///
/// #[async_trait]
/// impl KeyValueStore for NoExpiryStore {
///     async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
///         Ok(self.data.lock().await.get(key).cloned())
///     }
///
///     async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), AuthError> {
///         self.data.lock().await.insert(key.to_string(), value.to_string());
///         Ok(())
///     }
///
///     async fn delete(&self, key: &str) -> Result<bool, AuthError> {
///         Ok(self.data.lock().await.remove(key).is_some())
///     }
///
///     async fn increment_with_ttl(&self, key: &str, _ttl: Duration) -> Result<i64, AuthError> {
///         let mut data = self.data.lock().await;
///         let next = data.get(key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1;
///         data.insert(key.to_string(), next.to_string());
///         Ok(next)
///     }
///
///     async fn set_if_absent_with_ttl(
///         &self,
///         key: &str,
///         value: &str,
///         _ttl: Duration,
///     ) -> Result<bool, AuthError> {
///         let mut data = self.data.lock().await;
///         if data.contains_key(key) {
///             return Ok(false);
///         }
///         data.insert(key.to_string(), value.to_string());
///         Ok(true)
///     }
///
///     async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, AuthError> {
///         let mut data = self.data.lock().await;
///         if data.get(key).is_some_and(|v| v == expected) {
///             data.remove(key);
///             return Ok(true);
///         }
///         Ok(false)
///     }
///
///     async fn get_stats(&self) -> Result<StorageStats, AuthError> {
///         Ok(StorageStats {
///             total_keys: self.data.lock().await.len(),
///             backend_info: "No-expiry store".to_string(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Optional method for backend initialization.
    ///
    /// Called once by the service builder. Implementations can use it to
    /// open and health-check connections.
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Returns the value stored at `key`, or `None` if it is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    /// Stores `value` at `key`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError>;

    /// Removes `key`. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, AuthError>;

    /// Atomically increments the integer counter at `key` and sets its
    /// expiry to `ttl`, returning the post-increment value.
    ///
    /// A missing key counts as zero. The increment and the expiry refresh
    /// happen as one unit: no caller can observe the new count without the
    /// new expiry.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, AuthError>;

    /// Atomically stores `value` at `key` only if no live value exists.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The value was newly set by this call
    /// * `Ok(false)` - A live value already existed; nothing changed
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AuthError>;

    /// Atomically removes `key` only if its live value equals `expected`.
    ///
    /// Returns whether the key was removed. Used to consume an OTP exactly
    /// once and to end a session without clobbering a record a concurrent
    /// caller has already replaced.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, AuthError>;

    /// Returns statistics about the backend, for monitoring and debugging.
    async fn get_stats(&self) -> Result<StorageStats, AuthError>;
}
