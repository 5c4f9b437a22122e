//! # Phone Auth
//!
//! Passwordless phone-number login: one-time passcodes, short-lived access
//! tokens and rotating single-use refresh tokens with reuse detection.
//!
//! All cross-request state lives in a pluggable key-value store, so several
//! service instances can share one store and behave as one.
//!
//! ## Features
//!
//! - **OTP Challenges**: Random zero-padded codes with a TTL and a cap on failed attempts
//! - **Signed Tokens**: HS256 access and refresh tokens with independent secrets
//! - **Single-Use Refresh**: Every refresh token can be rotated exactly once
//! - **Reuse Detection**: Replaying a superseded refresh token revokes the session chain
//! - **Throttling**: Per-operation request limits backed by atomic store counters
//! - **Pluggable Storage**: In-memory store built in, Redis behind the `redis-storage` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use phone_auth::{AuthConfig, AuthError, Challenge, CredentialService, Notifier};
//! use async_trait::async_trait;
//!
//! struct SmsGateway;
//!
//! #[async_trait]
//! impl Notifier for SmsGateway {
//!     async fn notify(&self, challenge: &Challenge) -> Result<(), AuthError> {
//!         println!("sending {} to {}", challenge.code, challenge.phone);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), AuthError> {
//! let service = CredentialService::builder(AuthConfig::default())
//!     .with_notifier(SmsGateway)
//!     .build_and_init()
//!     .await?;
//!
//! service.request_challenge("+15551234567").await?;
//!
//! // The user types in the code they received
//! let pair = service.confirm_challenge("+15551234567", "482913", None).await?;
//!
//! // Each refresh token is good for exactly one rotation
//! let rotated = service.refresh(&pair.refresh_token).await?;
//! assert!(service.refresh(&pair.refresh_token).await.is_err());
//! # Ok(())
//! # }
//! ```
//!
//! ## Shared Redis Storage
//!
//! ```rust,ignore
//! use phone_auth::{AuthConfig, ConfigPreset, CredentialService};
//! use phone_auth::storage::RedisStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), phone_auth::AuthError> {
//! let store = Arc::new(RedisStore::new("redis://localhost:6379")?);
//! let service = CredentialService::builder(AuthConfig::from(ConfigPreset::Production))
//!     .with_store(store)
//!     .build_and_init()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`AuthConfig::default`] reads `PHONE_AUTH_*` environment variables:
//!
//! ```bash
//! export PHONE_AUTH_ACCESS_TOKEN_SECRET="..."
//! export PHONE_AUTH_REFRESH_TOKEN_SECRET="..."
//! export PHONE_AUTH_ACCESS_TOKEN_TTL=900
//! ```
//!
//! ## Architecture
//!
//! - **[`CredentialService`]**: The four user-facing operations plus bearer authentication
//! - **[`ChallengeIssuer`]**: OTP generation and redemption
//! - **[`TokenMinter`]**: Token signing and verification
//! - **[`SessionLedger`]**: Refresh-token sessions and rotation
//! - **[`Throttle`]**: Per-identity request limits
//! - **[`KeyValueStore`]**: The storage seam everything above is built on
//! - **[`AuthError`]**: Typed failures that map onto HTTP status codes

pub mod auth;

pub use auth::storage;

// Re-export commonly used types
pub use auth::{
    AuthConfig, AuthError, Challenge, ChallengeIssuer, ConfigPreset, CredentialService,
    CredentialServiceBuilder, KeyValueStore, LogNotifier, MemoryStore, Notifier, Operation,
    SessionLedger, Throttle, ThrottleConfig, TokenClaims, TokenMinter, TokenPair, TokenScope,
};
