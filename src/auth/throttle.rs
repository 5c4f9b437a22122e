//! Per-identity request throttling backed by the key-value store.

use crate::auth::config::ThrottleConfig;
use crate::auth::keys;
use crate::auth::storage::KeyValueStore;
use crate::AuthError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Operations protected by a throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Asking for a new OTP to be sent
    RequestChallenge,
    /// Redeeming an OTP for a token pair
    ConfirmChallenge,
    /// Rotating a refresh token
    Refresh,
}

impl Operation {
    /// Name used in the throttle key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::RequestChallenge => "request_challenge",
            Operation::ConfirmChallenge => "confirm_challenge",
            Operation::Refresh => "refresh",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds how often one identity may perform one operation.
///
/// Each call increments the counter at `rate_limit:<operation>:<identity>`
/// and refreshes its expiry to the window length in the same atomic store
/// operation. A window therefore ends only after `window` passes with no
/// calls at all. Rejected calls still count; nothing is rolled back.
pub struct Throttle<S: KeyValueStore> {
    store: Arc<S>,
    operation: Operation,
    limit: u64,
    window: Duration,
}

impl<S: KeyValueStore> Throttle<S> {
    pub fn new(store: Arc<S>, operation: Operation, config: ThrottleConfig) -> Self {
        Self {
            store,
            operation,
            limit: config.limit,
            window: config.window,
        }
    }

    /// Records one call for `identity`.
    ///
    /// # Errors
    ///
    /// * `TooManyRequests` - the post-increment count exceeds the limit
    /// * `Unexpected` - the store failed
    pub async fn allow(&self, identity: &str) -> Result<(), AuthError> {
        let key = keys::rate_limit(self.operation.as_str(), identity);
        let count = self.store.increment_with_ttl(&key, self.window).await?;

        if count > i64::try_from(self.limit).unwrap_or(i64::MAX) {
            tracing::warn!(
                operation = %self.operation,
                identity,
                count,
                limit = self.limit,
                "throttle limit exceeded"
            );
            return Err(AuthError::TooManyRequests("Too Many Requests".to_string()));
        }

        Ok(())
    }
}
