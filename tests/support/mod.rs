//! Store wrappers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use phone_auth::AuthError;
use phone_auth::storage::{KeyValueStore, MemoryStore, StorageStats};
use std::time::Duration;

/// Delegates to `MemoryStore`, sleeping before every call.
///
/// Spreads the steps of one operation across scheduler turns so that
/// concurrent callers interleave between them, the way they would against a
/// networked backend.
#[derive(Default)]
pub struct SlowStore {
    inner: MemoryStore,
    latency: Duration,
}

impl SlowStore {
    pub fn new(latency: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            latency,
        }
    }

    async fn pause(&self) {
        tokio::time::sleep(self.latency).await;
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.pause().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        self.pause().await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, AuthError> {
        self.pause().await;
        self.inner.delete(key).await
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        self.pause().await;
        self.inner.increment_with_ttl(key, ttl).await
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AuthError> {
        self.pause().await;
        self.inner.set_if_absent_with_ttl(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, AuthError> {
        self.pause().await;
        self.inner.compare_and_delete(key, expected).await
    }

    async fn get_stats(&self) -> Result<StorageStats, AuthError> {
        self.inner.get_stats().await
    }
}

/// Delegates to `MemoryStore` but refuses to write session records.
#[derive(Default)]
pub struct SessionWriteFailure {
    pub inner: MemoryStore,
}

#[async_trait]
impl KeyValueStore for SessionWriteFailure {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        if key.starts_with("refresh:") {
            return Err(AuthError::from_storage_message("connection reset"));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, AuthError> {
        self.inner.delete(key).await
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        self.inner.increment_with_ttl(key, ttl).await
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AuthError> {
        self.inner.set_if_absent_with_ttl(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, AuthError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn get_stats(&self) -> Result<StorageStats, AuthError> {
        self.inner.get_stats().await
    }
}
