use std::sync::Arc;

use regex::Regex;

use crate::auth::challenge::{ChallengeIssuer, ChallengePolicy};
use crate::auth::config::AuthConfig;
use crate::auth::ledger::SessionLedger;
use crate::auth::notifier::Notifier;
use crate::auth::service_builder::CredentialServiceBuilder;
use crate::auth::storage::{KeyValueStore, MemoryStore};
use crate::auth::throttle::{Operation, Throttle};
use crate::auth::token::{TokenClaims, TokenMinter, TokenPair, TokenScope};
use crate::AuthError;

const PHONE_PATTERN: &str = r"^\+?[1-9][0-9]{7,14}$";
const BEARER_PREFIX: &str = "Bearer ";

/// Phone-number login with OTP challenges and rotating refresh sessions.
///
/// `CredentialService` composes the challenge issuer, the token minter, the
/// session ledger and the per-operation throttles over one shared
/// [`KeyValueStore`]. It holds no mutable state of its own, so one instance
/// can serve any number of concurrent requests and several instances can
/// share one store.
///
/// # Example
///
/// ```rust
/// use phone_auth::{AuthConfig, CredentialService};
///
/// # async fn example() -> Result<(), phone_auth::AuthError> {
/// let service = CredentialService::builder(AuthConfig::testing())
///     .build_and_init()
///     .await?;
///
/// // Sends the code through the configured notifier
/// service.request_challenge("+15551234567").await?;
///
/// // Later, with the code the user typed in
/// let pair = service.confirm_challenge("+15551234567", "482913", None).await?;
///
/// // The access token authenticates requests
/// let claims = service
///     .authenticate(Some(&format!("Bearer {}", pair.access_token)))
///     .await?;
///
/// // The refresh token is exchanged for a new pair, once
/// let pair = service.refresh(&pair.refresh_token).await?;
///
/// service.logout(&claims).await?;
/// # Ok(())
/// # }
/// ```
pub struct CredentialService<S: KeyValueStore> {
    pub(crate) config: AuthConfig,
    pub(crate) store: Arc<S>,
    issuer: ChallengeIssuer<S>,
    ledger: SessionLedger<S>,
    notifier: Arc<dyn Notifier>,
    challenge_throttle: Throttle<S>,
    confirm_throttle: Throttle<S>,
    refresh_throttle: Throttle<S>,
    phone_pattern: Regex,
}

impl CredentialService<MemoryStore> {
    /// Creates a builder that defaults to `MemoryStore` and `LogNotifier`.
    pub fn builder(config: AuthConfig) -> CredentialServiceBuilder<MemoryStore> {
        CredentialServiceBuilder::new(config)
    }
}

impl<S: KeyValueStore> CredentialService<S> {
    pub(crate) fn new(
        config: AuthConfig,
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AuthError> {
        let phone_pattern = Regex::new(PHONE_PATTERN)
            .map_err(|e| AuthError::Unexpected(format!("Invalid phone pattern: {e}")))?;

        let issuer = ChallengeIssuer::new(
            Arc::clone(&store),
            ChallengePolicy {
                otp_length: config.otp_length,
                otp_ttl: config.otp_ttl,
                max_attempts: config.max_attempts,
                attempt_window: config.attempt_window,
            },
        );
        let ledger = SessionLedger::new(Arc::clone(&store), TokenMinter::new(&config));

        Ok(Self {
            challenge_throttle: Throttle::new(
                Arc::clone(&store),
                Operation::RequestChallenge,
                config.challenge_throttle,
            ),
            confirm_throttle: Throttle::new(
                Arc::clone(&store),
                Operation::ConfirmChallenge,
                config.confirm_throttle,
            ),
            refresh_throttle: Throttle::new(
                Arc::clone(&store),
                Operation::Refresh,
                config.refresh_throttle,
            ),
            issuer,
            ledger,
            notifier,
            phone_pattern,
            store,
            config,
        })
    }

    pub(crate) async fn init(&self) -> Result<(), AuthError> {
        self.store.init().await
    }

    /// Issues a new OTP for `phone` and hands it to the notifier.
    ///
    /// Throttled per phone number. Any previous code for the phone stops
    /// working.
    pub async fn request_challenge(&self, phone: &str) -> Result<(), AuthError> {
        self.validate_phone(phone)?;
        self.challenge_throttle.allow(phone).await?;

        let challenge = self.issuer.issue(phone).await?;
        self.notifier.notify(&challenge).await
    }

    /// Redeems an OTP and starts a session for the device.
    ///
    /// A device id is generated when none (or an empty one) is supplied.
    /// The code is consumed before the session is written; if writing the
    /// session fails the code is put back, so the user can retry with it.
    pub async fn confirm_challenge(
        &self,
        phone: &str,
        code: &str,
        device_id: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        self.validate_phone(phone)?;
        let redemption = self.issuer.verify(phone, code).await?;
        self.issuer.consume(&redemption).await?;

        let device_id = match device_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let pair = match self.ledger.issue(phone, &device_id).await {
            Ok(pair) => pair,
            Err(e) => {
                if let Err(restore_err) = self.issuer.restore(&redemption).await {
                    tracing::error!(phone, error = %restore_err, "failed to restore otp challenge");
                }
                return Err(e);
            }
        };

        // The session is live; a stale counter only expires later
        if let Err(e) = self.issuer.clear_attempts(phone).await {
            tracing::warn!(phone, error = %e, "failed to clear otp attempt counter");
        }
        Ok(pair)
    }

    /// Rotates a refresh token into a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::BadRequest("Refresh token is required".to_string()));
        }
        self.ledger.rotate(refresh_token).await
    }

    /// Ends the session named by already verified claims.
    pub async fn logout(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        self.ledger.end(&claims.sub, &claims.did).await
    }

    /// Verifies an `Authorization` header value carrying an access token.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<TokenClaims, AuthError> {
        let header = match authorization {
            Some(header) if !header.is_empty() => header,
            _ => return Err(AuthError::Unauthorized("Missing token".to_string())),
        };
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .ok_or_else(|| AuthError::Unauthorized("Invalid token format".to_string()))?;

        self.ledger
            .minter()
            .verify(token, Some(TokenScope::Access))
    }

    /// Counts one call of `operation` by `identity` against its throttle.
    ///
    /// `request_challenge` applies its own per-phone throttle. Transports use
    /// this to throttle by caller identity, such as the client address.
    pub async fn check_rate(&self, operation: Operation, identity: &str) -> Result<(), AuthError> {
        match operation {
            Operation::RequestChallenge => self.challenge_throttle.allow(identity).await,
            Operation::ConfirmChallenge => self.confirm_throttle.allow(identity).await,
            Operation::Refresh => self.refresh_throttle.allow(identity).await,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Returns a reference to the store backend.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn validate_phone(&self, phone: &str) -> Result<(), AuthError> {
        if self.phone_pattern.is_match(phone) {
            Ok(())
        } else {
            Err(AuthError::BadRequest("Invalid phone number".to_string()))
        }
    }
}
