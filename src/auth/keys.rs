//! Key namespaces used in the key-value store.
//!
//! These names are a stable contract: other services sharing the same store,
//! and operators inspecting it, rely on them.

/// Outstanding OTP challenge for a phone.
pub fn challenge(phone: &str) -> String {
    format!("otp:{phone}")
}

/// OTP verification attempt counter for a phone.
pub fn attempts(phone: &str) -> String {
    format!("otp_attempts:{phone}")
}

/// Current live refresh token for a (phone, device) pair.
pub fn session(phone: &str, device_id: &str) -> String {
    format!("refresh:{phone}:{device_id}")
}

/// Single-use marker for a refresh token id.
pub fn used(token_id: &str) -> String {
    format!("used:{token_id}")
}

/// Revocation entry for a refresh token id.
pub fn revoked(token_id: &str) -> String {
    format!("revoked:{token_id}")
}

/// Throttle counter for an operation and caller identity.
pub fn rate_limit(operation: &str, identity: &str) -> String {
    format!("rate_limit:{operation}:{identity}")
}
