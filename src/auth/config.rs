use crate::AuthError;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Predefined configuration presets for common deployment scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Production-ready configuration.
    ///
    /// - Access token: 15 minutes, refresh token: 7 days
    /// - OTP: 6 digits, valid 5 minutes, 5 attempts per 15 minutes
    /// - Challenge requests: 5 per 15 minutes per phone
    ///
    /// Secrets are read from the environment like [`ConfigPreset::FromEnv`];
    /// production has no usable default secret.
    Production,

    /// Development-friendly configuration.
    ///
    /// Same shape as production with fixed, well-known secrets, a one hour
    /// access token and a relaxed challenge throttle. Never deploy this.
    Development,

    /// Load configuration from environment variables.
    ///
    /// Every field can be overridden by a `PHONE_AUTH_*` variable; durations
    /// are whole seconds:
    /// - `PHONE_AUTH_ACCESS_TOKEN_SECRET`, `PHONE_AUTH_REFRESH_TOKEN_SECRET`
    /// - `PHONE_AUTH_ACCESS_TOKEN_TTL` (default: 900)
    /// - `PHONE_AUTH_REFRESH_TOKEN_TTL` (default: 604800)
    /// - `PHONE_AUTH_OTP_LENGTH` (default: 6), `PHONE_AUTH_OTP_TTL` (default: 300)
    /// - `PHONE_AUTH_MAX_ATTEMPTS` (default: 5), `PHONE_AUTH_ATTEMPT_WINDOW` (default: 900)
    /// - `PHONE_AUTH_CHALLENGE_LIMIT` / `PHONE_AUTH_CHALLENGE_WINDOW` (default: 5 / 900)
    /// - `PHONE_AUTH_CONFIRM_LIMIT` / `PHONE_AUTH_CONFIRM_WINDOW` (default: 10 / 60)
    /// - `PHONE_AUTH_REFRESH_LIMIT` / `PHONE_AUTH_REFRESH_WINDOW` (default: 10 / 60)
    FromEnv,
}

/// Limit and window for one throttled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Calls allowed per identity within one window
    pub limit: u64,
    /// Counter lifetime, refreshed on every call
    pub window: Duration,
}

impl ThrottleConfig {
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Configuration for the credential service.
///
/// # Example
///
/// ```rust
/// use phone_auth::{AuthConfig, ConfigPreset};
/// use secrecy::SecretString;
/// use std::time::Duration;
///
/// let config = AuthConfig {
///     access_token_secret: SecretString::new("a-long-random-access-secret".to_string()),
///     refresh_token_secret: SecretString::new("another-long-random-secret".to_string()),
///     access_token_ttl: Duration::from_secs(600),
///     ..AuthConfig::from(ConfigPreset::Development)
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Number of digits in an OTP code
    pub otp_length: usize,
    /// How long an issued OTP can be redeemed
    pub otp_ttl: Duration,
    /// Failed redemptions allowed per phone before lockout
    pub max_attempts: u32,
    /// Lifetime of the failed-attempt counter
    pub attempt_window: Duration,
    /// HMAC key for access tokens
    pub access_token_secret: SecretString,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// HMAC key for refresh tokens, independent of the access key
    pub refresh_token_secret: SecretString,
    /// Refresh token and session record lifetime
    pub refresh_token_ttl: Duration,
    /// Throttle for challenge requests, keyed by phone
    pub challenge_throttle: ThrottleConfig,
    /// Throttle for challenge confirmation, keyed by caller identity
    pub confirm_throttle: ThrottleConfig,
    /// Throttle for token refresh, keyed by caller identity
    pub refresh_throttle: ThrottleConfig,
}

const DEFAULT_OTP_LENGTH: usize = 6;
const DEFAULT_OTP_TTL: u64 = 5 * 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ATTEMPT_WINDOW: u64 = 15 * 60;
const DEFAULT_ACCESS_TTL: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL: u64 = 7 * 24 * 60 * 60;

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from(ConfigPreset::FromEnv)
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_or(name, default))
}

fn env_secret(name: &str) -> SecretString {
    SecretString::new(std::env::var(name).unwrap_or_default())
}

impl AuthConfig {
    /// Development settings with short lifetimes, for unit and integration tests.
    pub fn testing() -> Self {
        Self {
            otp_ttl: Duration::from_secs(60),
            access_token_ttl: Duration::from_secs(60),
            refresh_token_ttl: Duration::from_secs(300),
            ..Self::from(ConfigPreset::Development)
        }
    }

    /// Checks that the configuration is usable at all.
    ///
    /// Unlike [`AuthConfig::warnings`], a failure here means the service
    /// must not start.
    pub fn validate(&self) -> Result<(), AuthError> {
        let access = self.access_token_secret.expose_secret();
        let refresh = self.refresh_token_secret.expose_secret();

        if access.is_empty() || refresh.is_empty() {
            return Err(AuthError::Unexpected(
                "Access and refresh token secrets must be set".to_string(),
            ));
        }
        if access == refresh {
            return Err(AuthError::Unexpected(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }
        if !(4..=9).contains(&self.otp_length) {
            return Err(AuthError::Unexpected(format!(
                "OTP length must be between 4 and 9 digits, got {}",
                self.otp_length
            )));
        }
        if self.max_attempts == 0 {
            return Err(AuthError::Unexpected(
                "Max OTP attempts must be at least 1".to_string(),
            ));
        }
        for (name, throttle) in [
            ("challenge", &self.challenge_throttle),
            ("confirm", &self.confirm_throttle),
            ("refresh", &self.refresh_throttle),
        ] {
            if throttle.limit == 0 || throttle.window.is_zero() {
                return Err(AuthError::Unexpected(format!(
                    "The {name} throttle needs a non-zero limit and window"
                )));
            }
        }
        for (name, ttl) in [
            ("OTP", self.otp_ttl),
            ("attempt window", self.attempt_window),
            ("access token", self.access_token_ttl),
            ("refresh token", self.refresh_token_ttl),
        ] {
            if ttl.is_zero() {
                return Err(AuthError::Unexpected(format!("The {name} TTL must be non-zero")));
            }
        }

        Ok(())
    }

    /// Returns warnings for settings that work but weaken security or usability.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.access_token_secret.expose_secret().len() < 32
            || self.refresh_token_secret.expose_secret().len() < 32
        {
            warnings.push("Token secrets shorter than 32 bytes are easy to brute-force".to_string());
        }
        if self.access_token_ttl > Duration::from_secs(60 * 60) {
            warnings.push("Long access token TTL (> 1 hour) delays logout effects".to_string());
        }
        if self.refresh_token_ttl <= self.access_token_ttl {
            warnings.push(
                "Refresh token TTL should be longer than the access token TTL".to_string(),
            );
        }
        if self.otp_ttl > Duration::from_secs(15 * 60) {
            warnings.push("Long OTP TTL (> 15 minutes) widens the guessing window".to_string());
        }
        if self.attempt_window < self.otp_ttl {
            warnings.push(
                "Attempt window shorter than the OTP TTL lets the attempt cap reset mid-challenge"
                    .to_string(),
            );
        }

        warnings
    }

    /// Returns a summary of the non-secret settings.
    pub fn summary(&self) -> String {
        format!(
            "AuthConfig {{ OTP: {} digits/{}s, Attempts: {}/{}s, Access TTL: {}s, Refresh TTL: {}s, Challenge throttle: {}/{}s }}",
            self.otp_length,
            self.otp_ttl.as_secs(),
            self.max_attempts,
            self.attempt_window.as_secs(),
            self.access_token_ttl.as_secs(),
            self.refresh_token_ttl.as_secs(),
            self.challenge_throttle.limit,
            self.challenge_throttle.window.as_secs(),
        )
    }
}

impl From<ConfigPreset> for AuthConfig {
    fn from(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Production => Self {
                otp_length: DEFAULT_OTP_LENGTH,
                otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                attempt_window: Duration::from_secs(DEFAULT_ATTEMPT_WINDOW),
                access_token_secret: env_secret("PHONE_AUTH_ACCESS_TOKEN_SECRET"),
                access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL),
                refresh_token_secret: env_secret("PHONE_AUTH_REFRESH_TOKEN_SECRET"),
                refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL),
                challenge_throttle: ThrottleConfig::new(5, Duration::from_secs(15 * 60)),
                confirm_throttle: ThrottleConfig::new(10, Duration::from_secs(60)),
                refresh_throttle: ThrottleConfig::new(10, Duration::from_secs(60)),
            },
            ConfigPreset::Development => Self {
                access_token_secret: SecretString::new(
                    "development-access-secret-do-not-deploy".to_string(),
                ),
                access_token_ttl: Duration::from_secs(60 * 60),
                refresh_token_secret: SecretString::new(
                    "development-refresh-secret-do-not-deploy".to_string(),
                ),
                challenge_throttle: ThrottleConfig::new(30, Duration::from_secs(60)),
                ..Self::from(ConfigPreset::Production)
            },
            ConfigPreset::FromEnv => Self {
                otp_length: env_or("PHONE_AUTH_OTP_LENGTH", DEFAULT_OTP_LENGTH),
                otp_ttl: env_secs("PHONE_AUTH_OTP_TTL", DEFAULT_OTP_TTL),
                max_attempts: env_or("PHONE_AUTH_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                attempt_window: env_secs("PHONE_AUTH_ATTEMPT_WINDOW", DEFAULT_ATTEMPT_WINDOW),
                access_token_secret: env_secret("PHONE_AUTH_ACCESS_TOKEN_SECRET"),
                access_token_ttl: env_secs("PHONE_AUTH_ACCESS_TOKEN_TTL", DEFAULT_ACCESS_TTL),
                refresh_token_secret: env_secret("PHONE_AUTH_REFRESH_TOKEN_SECRET"),
                refresh_token_ttl: env_secs("PHONE_AUTH_REFRESH_TOKEN_TTL", DEFAULT_REFRESH_TTL),
                challenge_throttle: ThrottleConfig::new(
                    env_or("PHONE_AUTH_CHALLENGE_LIMIT", 5),
                    env_secs("PHONE_AUTH_CHALLENGE_WINDOW", 15 * 60),
                ),
                confirm_throttle: ThrottleConfig::new(
                    env_or("PHONE_AUTH_CONFIRM_LIMIT", 10),
                    env_secs("PHONE_AUTH_CONFIRM_WINDOW", 60),
                ),
                refresh_throttle: ThrottleConfig::new(
                    env_or("PHONE_AUTH_REFRESH_LIMIT", 10),
                    env_secs("PHONE_AUTH_REFRESH_WINDOW", 60),
                ),
            },
        }
    }
}
