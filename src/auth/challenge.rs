//! OTP challenge issuance and redemption.

use crate::auth::keys;
use crate::auth::storage::KeyValueStore;
use crate::auth::time_utils::current_timestamp;
use crate::AuthError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// An outstanding one-time passcode for a phone number.
///
/// Stored as JSON at `otp:<phone>`. Only one exists per phone; issuing a
/// new challenge replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Phone number the code was sent to
    pub phone: String,
    /// Zero-padded decimal code
    pub code: String,
    /// Unix timestamp of issuance
    pub created_at: i64,
}

/// Settings for [`ChallengeIssuer`].
#[derive(Debug, Clone, Copy)]
pub struct ChallengePolicy {
    pub otp_length: usize,
    pub otp_ttl: Duration,
    pub max_attempts: u32,
    pub attempt_window: Duration,
}

/// Generates and verifies OTP codes with a bounded number of attempts.
///
/// Every redemption attempt, including a malformed code, first increments a
/// per-phone counter at `otp_attempts:<phone>` that expires independently of
/// the challenge. An attempt whose count exceeds the cap fails with
/// `TooManyRequests` before the code is looked at, even when it is correct.
/// Only a completed redemption clears the counter.
///
/// Redemption is split in two so callers can commit other state between the
/// steps: [`verify`](Self::verify) checks the code without changing the
/// challenge, [`consume`](Self::consume) removes it atomically. Of several
/// concurrent callers holding the same verified code, exactly one consumes it.
pub struct ChallengeIssuer<S: KeyValueStore> {
    store: Arc<S>,
    policy: ChallengePolicy,
}

/// A code that matched the outstanding challenge and is not yet consumed.
#[derive(Debug, Clone)]
pub struct Redemption {
    challenge: Challenge,
    stored: String,
}

impl Redemption {
    /// The challenge the code matched.
    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

impl<S: KeyValueStore> ChallengeIssuer<S> {
    pub fn new(store: Arc<S>, policy: ChallengePolicy) -> Self {
        Self { store, policy }
    }

    /// Creates a fresh challenge for `phone`, replacing any previous one.
    pub async fn issue(&self, phone: &str) -> Result<Challenge, AuthError> {
        let challenge = Challenge {
            phone: phone.to_string(),
            code: generate_code(self.policy.otp_length)?,
            created_at: current_timestamp()?,
        };

        let value = serde_json::to_string(&challenge)
            .map_err(|e| AuthError::Unexpected(format!("Failed to encode challenge: {e}")))?;
        self.store
            .set(&keys::challenge(phone), &value, self.policy.otp_ttl)
            .await?;

        tracing::debug!(phone, "otp challenge issued");
        Ok(challenge)
    }

    /// Redeems `code` against the outstanding challenge for `phone`.
    ///
    /// Equivalent to [`verify`](Self::verify), [`consume`](Self::consume) and
    /// [`clear_attempts`](Self::clear_attempts) in sequence, so a code can be
    /// redeemed only once.
    pub async fn redeem(&self, phone: &str, code: &str) -> Result<(), AuthError> {
        let redemption = self.verify(phone, code).await?;
        self.consume(&redemption).await?;
        self.clear_attempts(phone).await
    }

    /// Checks `code` against the outstanding challenge for `phone`.
    ///
    /// Counts one attempt and leaves the challenge in place.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// * `TooManyRequests` - this attempt is over the cap
    /// * `BadRequest` - the code is not `otp_length` digits
    /// * `Gone` - no challenge exists, it expired or was already redeemed
    /// * `Invalid` - the code does not match
    pub async fn verify(&self, phone: &str, code: &str) -> Result<Redemption, AuthError> {
        let attempt = self
            .store
            .increment_with_ttl(&keys::attempts(phone), self.policy.attempt_window)
            .await?;
        if attempt > i64::from(self.policy.max_attempts) {
            tracing::warn!(phone, attempt, "otp attempt cap reached");
            return Err(AuthError::TooManyRequests(
                "Too many failed attempts, request a new code later".to_string(),
            ));
        }

        if !is_well_formed(code, self.policy.otp_length) {
            return Err(AuthError::BadRequest(format!(
                "OTP must be {} digits",
                self.policy.otp_length
            )));
        }

        let stored = match self.store.get(&keys::challenge(phone)).await? {
            Some(value) => value,
            None => return Err(AuthError::Gone("OTP has expired".to_string())),
        };
        let challenge = serde_json::from_str::<Challenge>(&stored)
            .map_err(|e| AuthError::Unexpected(format!("Failed to decode stored challenge: {e}")))?;

        if !constant_time_eq(challenge.code.as_bytes(), code.as_bytes()) {
            return Err(AuthError::Invalid("Invalid OTP code".to_string()));
        }

        Ok(Redemption { challenge, stored })
    }

    /// Removes the verified challenge if it is still the one outstanding.
    ///
    /// Fails with `Gone` when another caller consumed it first, or when it
    /// expired or was replaced since [`verify`](Self::verify).
    pub async fn consume(&self, redemption: &Redemption) -> Result<(), AuthError> {
        let phone = redemption.challenge.phone.as_str();
        let removed = self
            .store
            .compare_and_delete(&keys::challenge(phone), &redemption.stored)
            .await?;
        if !removed {
            tracing::debug!(phone, "otp challenge already consumed");
            return Err(AuthError::Gone("OTP has expired".to_string()));
        }

        tracing::debug!(phone, "otp challenge redeemed");
        Ok(())
    }

    /// Puts a consumed challenge back for the rest of its lifetime.
    ///
    /// Does nothing when the challenge has run out or a newer one was issued
    /// in the meantime.
    pub async fn restore(&self, redemption: &Redemption) -> Result<(), AuthError> {
        let challenge = &redemption.challenge;
        let elapsed = current_timestamp()?.saturating_sub(challenge.created_at);
        let remaining = self
            .policy
            .otp_ttl
            .saturating_sub(Duration::from_secs(u64::try_from(elapsed).unwrap_or(0)));
        if remaining.is_zero() {
            return Ok(());
        }

        let restored = self
            .store
            .set_if_absent_with_ttl(&keys::challenge(&challenge.phone), &redemption.stored, remaining)
            .await?;
        tracing::debug!(phone = %challenge.phone, restored, "otp challenge restored");
        Ok(())
    }

    /// Resets the attempt counter for `phone`.
    pub async fn clear_attempts(&self, phone: &str) -> Result<(), AuthError> {
        self.store.delete(&keys::attempts(phone)).await?;
        Ok(())
    }
}

/// Uniformly random zero-padded decimal code.
fn generate_code(length: usize) -> Result<String, AuthError> {
    let upper = u32::try_from(length)
        .ok()
        .filter(|&exp| exp > 0)
        .and_then(|exp| 10u64.checked_pow(exp))
        .ok_or_else(|| AuthError::Unexpected(format!("OTP length {length} is out of range")))?;
    let value = rand::thread_rng().gen_range(0..upper);
    Ok(format!("{value:0length$}"))
}

fn is_well_formed(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| b.is_ascii_digit())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
