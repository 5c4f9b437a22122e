//! Signed access and refresh tokens.

use crate::auth::config::AuthConfig;
use crate::auth::time_utils::{current_timestamp, expires_at};
use crate::AuthError;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const ACCESS_SCOPE: &str = "access";
const REFRESH_SCOPE: &str = "refresh";

/// Which kind of token a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    Access,
    Refresh,
}

/// Decoded token payload.
///
/// Access tokens carry `scope: "access"` and no `jti`; refresh tokens carry
/// `scp: "refresh"` and a unique `jti`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Phone number of the session owner
    #[serde(default)]
    pub sub: String,
    /// Device id of the session
    #[serde(default)]
    pub did: String,
    /// Unique token id, refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// The scope this token declares, if it declares exactly one known scope.
    pub fn token_scope(&self) -> Option<TokenScope> {
        match (self.scope.as_deref(), self.scp.as_deref()) {
            (Some(ACCESS_SCOPE), None) => Some(TokenScope::Access),
            (None, Some(REFRESH_SCOPE)) => Some(TokenScope::Refresh),
            _ => None,
        }
    }
}

/// Access and refresh token issued together for one device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub device_id: String,
}

/// Mints and verifies HS256 tokens.
///
/// Access and refresh tokens are signed with independent secrets, so a token
/// of one kind never verifies as the other.
#[derive(Clone)]
pub struct TokenMinter {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenMinter {
    pub fn new(config: &AuthConfig) -> Self {
        let access = config.access_token_secret.expose_secret().as_bytes();
        let refresh = config.refresh_token_secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            access_encoding: EncodingKey::from_secret(access),
            access_decoding: DecodingKey::from_secret(access),
            access_ttl: config.access_token_ttl,
            refresh_encoding: EncodingKey::from_secret(refresh),
            refresh_decoding: DecodingKey::from_secret(refresh),
            refresh_ttl: config.refresh_token_ttl,
            validation,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mints a short-lived access token.
    pub fn mint_access(&self, phone: &str, device_id: &str) -> Result<String, AuthError> {
        let now = current_timestamp()?;
        let claims = TokenClaims {
            sub: phone.to_string(),
            did: device_id.to_string(),
            jti: None,
            scope: Some(ACCESS_SCOPE.to_string()),
            scp: None,
            iat: now,
            exp: expires_at(now, self.access_ttl),
        };
        sign(&claims, &self.access_encoding)
    }

    /// Mints a refresh token with a fresh id, returning the token and its id.
    pub fn mint_refresh(&self, phone: &str, device_id: &str) -> Result<(String, String), AuthError> {
        let now = current_timestamp()?;
        let jti = Uuid::new_v4().to_string();
        let claims = TokenClaims {
            sub: phone.to_string(),
            did: device_id.to_string(),
            jti: Some(jti.clone()),
            scope: None,
            scp: Some(REFRESH_SCOPE.to_string()),
            iat: now,
            exp: expires_at(now, self.refresh_ttl),
        };
        Ok((sign(&claims, &self.refresh_encoding)?, jti))
    }

    /// Verifies a token's signature, expiry and shape.
    ///
    /// With `expected` set, only that kind of token is accepted. With `None`
    /// the token is checked as an access token first and as a refresh token
    /// second.
    ///
    /// Every failure is `Unauthorized`; the message does not say which check
    /// failed.
    pub fn verify(&self, token: &str, expected: Option<TokenScope>) -> Result<TokenClaims, AuthError> {
        match expected {
            Some(scope) => self.verify_as(token, scope),
            None => self
                .verify_as(token, TokenScope::Access)
                .or_else(|_| self.verify_as(token, TokenScope::Refresh)),
        }
    }

    fn verify_as(&self, token: &str, scope: TokenScope) -> Result<TokenClaims, AuthError> {
        let key = match scope {
            TokenScope::Access => &self.access_decoding,
            TokenScope::Refresh => &self.refresh_decoding,
        };

        let claims = decode::<TokenClaims>(token, key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, ?scope, "token rejected");
                invalid_token()
            })?
            .claims;

        if claims.sub.is_empty() || claims.did.is_empty() {
            return Err(invalid_token());
        }
        if claims.token_scope() != Some(scope) {
            return Err(invalid_token());
        }
        if scope == TokenScope::Refresh && claims.jti.as_deref().is_none_or(str::is_empty) {
            return Err(invalid_token());
        }

        Ok(claims)
    }
}

fn sign(claims: &TokenClaims, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Unexpected(format!("Failed to sign token: {e}")))
}

pub(crate) fn invalid_token() -> AuthError {
    AuthError::Unauthorized("Invalid token".to_string())
}
