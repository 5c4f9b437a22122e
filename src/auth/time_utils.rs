//! Time utilities for safe timestamp handling.
//!
//! Token claims and stored records carry Unix timestamps; these helpers
//! produce them without panicking on a misbehaving system clock.

use crate::auth::error::AuthError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since Unix epoch.
///
/// In the extremely rare case where system time is before Unix epoch,
/// it returns an error instead of panicking.
pub(crate) fn current_timestamp() -> Result<i64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| AuthError::Unexpected("System time is before Unix epoch".to_string()))
}

/// Timestamp `ttl` after `now`, saturating instead of overflowing.
pub(crate) fn expires_at(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}
