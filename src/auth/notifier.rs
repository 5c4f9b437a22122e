//! Delivery of OTP codes to the phone owner.

use crate::auth::challenge::Challenge;
use crate::AuthError;
use async_trait::async_trait;

/// Delivers a freshly issued challenge, typically by SMS.
///
/// A failure is reported to the caller of `request_challenge` as-is. The
/// challenge stays stored, so a retry issues a new code rather than
/// resending the old one.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, challenge: &Challenge) -> Result<(), AuthError>;
}

/// Writes the code to the log instead of sending it.
///
/// Only suitable for development: anyone with log access can log in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, challenge: &Challenge) -> Result<(), AuthError> {
        tracing::info!(phone = %challenge.phone, code = %challenge.code, "otp code generated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_accepts_challenge() {
        let challenge = Challenge {
            phone: "+15551234567".to_string(),
            code: "482913".to_string(),
            created_at: 0,
        };
        assert_eq!(LogNotifier.notify(&challenge).await, Ok(()));
    }
}
