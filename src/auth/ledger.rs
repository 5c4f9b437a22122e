//! Refresh-token sessions with single-use rotation and reuse detection.

use crate::auth::keys;
use crate::auth::storage::KeyValueStore;
use crate::auth::token::{TokenMinter, TokenPair, TokenScope};
use crate::AuthError;
use std::sync::Arc;

/// Tracks the one live refresh token per (phone, device) pair.
///
/// The session record at `refresh:<phone>:<device>` holds the exact token
/// string that may be rotated next. Each token id can be rotated at most
/// once (`used:<jti>`), and ids found misused are written to
/// `revoked:<jti>`. All markers live as long as a refresh token does.
///
/// # Reuse detection
///
/// Presenting a refresh token that the session has already moved past is
/// treated as theft: the presented id is revoked and so is the id of the
/// token the session currently holds, so neither the attacker nor the
/// victim can keep the chain alive. The owner has to log in again.
///
/// Two callers racing to rotate the same current token are settled by the
/// used-marker: exactly one proceeds and the other is treated as reuse.
pub struct SessionLedger<S: KeyValueStore> {
    store: Arc<S>,
    minter: TokenMinter,
}

impl<S: KeyValueStore> SessionLedger<S> {
    pub fn new(store: Arc<S>, minter: TokenMinter) -> Self {
        Self { store, minter }
    }

    pub fn minter(&self) -> &TokenMinter {
        &self.minter
    }

    /// Starts a session for a device, replacing any session it had.
    pub async fn issue(&self, phone: &str, device_id: &str) -> Result<TokenPair, AuthError> {
        let pair = self.mint_pair(phone, device_id).await?;
        tracing::debug!(phone, device_id, "session issued");
        Ok(pair)
    }

    /// Exchanges a refresh token for a new pair, consuming the old token.
    ///
    /// Every rejection is `Unauthorized("Invalid refresh token")`, whether
    /// the token was malformed or its reuse was just detected.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .minter
            .verify(refresh_token, Some(TokenScope::Refresh))
            .map_err(|_| invalid_refresh_token())?;
        let jti = claims.jti.as_deref().ok_or_else(invalid_refresh_token)?;
        let (phone, device_id) = (claims.sub.as_str(), claims.did.as_str());

        if self.store.get(&keys::revoked(jti)).await?.is_some() {
            return Err(invalid_refresh_token());
        }

        let session_key = keys::session(phone, device_id);
        let Some(current) = self.store.get(&session_key).await? else {
            return Err(invalid_refresh_token());
        };

        if current != refresh_token {
            tracing::warn!(phone, device_id, jti, "superseded refresh token presented");
            self.revoke(jti).await?;
            if let Ok(current_claims) = self.minter.verify(&current, Some(TokenScope::Refresh)) {
                if let Some(current_jti) = current_claims.jti.as_deref() {
                    self.revoke(current_jti).await?;
                }
            }
            return Err(invalid_refresh_token());
        }

        let first_use = self
            .store
            .set_if_absent_with_ttl(&keys::used(jti), "1", self.minter.refresh_ttl())
            .await?;
        if !first_use {
            tracing::warn!(phone, device_id, jti, "refresh token rotated twice");
            self.store
                .compare_and_delete(&session_key, refresh_token)
                .await?;
            self.revoke(jti).await?;
            return Err(invalid_refresh_token());
        }

        let pair = self.mint_pair(phone, device_id).await?;
        tracing::debug!(phone, device_id, "session rotated");
        Ok(pair)
    }

    /// Ends a device session. Outstanding tokens are not revoked; the
    /// refresh token simply has no session left to rotate.
    pub async fn end(&self, phone: &str, device_id: &str) -> Result<(), AuthError> {
        self.store.delete(&keys::session(phone, device_id)).await?;
        tracing::debug!(phone, device_id, "session ended");
        Ok(())
    }

    async fn mint_pair(&self, phone: &str, device_id: &str) -> Result<TokenPair, AuthError> {
        let access_token = self.minter.mint_access(phone, device_id)?;
        let (refresh_token, _) = self.minter.mint_refresh(phone, device_id)?;

        self.store
            .set(
                &keys::session(phone, device_id),
                &refresh_token,
                self.minter.refresh_ttl(),
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            device_id: device_id.to_string(),
        })
    }

    async fn revoke(&self, jti: &str) -> Result<(), AuthError> {
        self.store
            .set(&keys::revoked(jti), "1", self.minter.refresh_ttl())
            .await
    }
}

fn invalid_refresh_token() -> AuthError {
    AuthError::Unauthorized("Invalid refresh token".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::AuthConfig;
    use crate::auth::storage::MemoryStore;

    const PHONE: &str = "+15551234567";
    const DEVICE: &str = "device-1";

    fn ledger(store: &Arc<MemoryStore>) -> SessionLedger<MemoryStore> {
        SessionLedger::new(Arc::clone(store), TokenMinter::new(&AuthConfig::testing()))
    }

    fn jti_of(ledger: &SessionLedger<MemoryStore>, token: &str) -> String {
        ledger
            .minter()
            .verify(token, Some(TokenScope::Refresh))
            .unwrap()
            .jti
            .unwrap()
    }

    fn is_unauthorized(result: Result<TokenPair, AuthError>) -> bool {
        matches!(result, Err(AuthError::Unauthorized(msg)) if msg == "Invalid refresh token")
    }

    #[tokio::test]
    async fn test_issue_writes_session_record() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);

        let pair = ledger.issue(PHONE, DEVICE).await.unwrap();

        assert_eq!(pair.device_id, DEVICE);
        let stored = store.get("refresh:+15551234567:device-1").await.unwrap();
        assert_eq!(stored.as_deref(), Some(pair.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn test_rotate_replaces_session_token() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let first = ledger.issue(PHONE, DEVICE).await.unwrap();

        let second = ledger.rotate(&first.refresh_token).await.unwrap();

        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(second.device_id, DEVICE);
        let stored = store.get("refresh:+15551234567:device-1").await.unwrap();
        assert_eq!(stored.as_deref(), Some(second.refresh_token.as_str()));

        let used = format!("used:{}", jti_of(&ledger, &first.refresh_token));
        assert!(store.get(&used).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reuse_revokes_the_whole_chain() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let r0 = ledger.issue(PHONE, DEVICE).await.unwrap().refresh_token;
        let r1 = ledger.rotate(&r0).await.unwrap().refresh_token;

        assert!(is_unauthorized(ledger.rotate(&r0).await));

        let revoked_r0 = format!("revoked:{}", jti_of(&ledger, &r0));
        let revoked_r1 = format!("revoked:{}", jti_of(&ledger, &r1));
        assert!(store.get(&revoked_r0).await.unwrap().is_some());
        assert!(store.get(&revoked_r1).await.unwrap().is_some());

        assert!(is_unauthorized(ledger.rotate(&r1).await));
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let pair = ledger.issue(PHONE, DEVICE).await.unwrap();
        let jti = jti_of(&ledger, &pair.refresh_token);

        store
            .set(&format!("revoked:{jti}"), "1", std::time::Duration::from_secs(60))
            .await
            .unwrap();

        assert!(is_unauthorized(ledger.rotate(&pair.refresh_token).await));
        assert_eq!(store.get(&format!("used:{jti}")).await.unwrap(), None);
        assert!(store.get("refresh:+15551234567:device-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_used_marker_without_session_change_is_reuse() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let pair = ledger.issue(PHONE, DEVICE).await.unwrap();
        let jti = jti_of(&ledger, &pair.refresh_token);

        // A racing rotation claimed the token but has not written its session yet
        store
            .set(&format!("used:{jti}"), "1", std::time::Duration::from_secs(60))
            .await
            .unwrap();

        assert!(is_unauthorized(ledger.rotate(&pair.refresh_token).await));
        assert_eq!(store.get("refresh:+15551234567:device-1").await.unwrap(), None);
        assert!(store.get(&format!("revoked:{jti}")).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_has_one_winner() {
        for _ in 0..20 {
            let store = Arc::new(MemoryStore::new());
            let ledger = Arc::new(ledger(&store));
            let r0 = ledger.issue(PHONE, DEVICE).await.unwrap().refresh_token;
            let barrier = Arc::new(tokio::sync::Barrier::new(2));

            let mut handles = vec![];
            for _ in 0..2 {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let r0 = r0.clone();
                handles.push(tokio::spawn(async move {
                    barrier.wait().await;
                    ledger.rotate(&r0).await
                }));
            }

            let mut winners = vec![];
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(pair) => winners.push(pair),
                    Err(e) => assert!(matches!(e, AuthError::Unauthorized(_))),
                }
            }

            assert_eq!(winners.len(), 1);
            let stored = store.get("refresh:+15551234567:device-1").await.unwrap();
            assert_eq!(stored.as_deref(), Some(winners[0].refresh_token.as_str()));
        }
    }

    #[tokio::test]
    async fn test_end_blocks_rotation() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let pair = ledger.issue(PHONE, DEVICE).await.unwrap();

        ledger.end(PHONE, DEVICE).await.unwrap();

        assert!(is_unauthorized(ledger.rotate(&pair.refresh_token).await));
        // Logout is not a revocation
        let jti = jti_of(&ledger, &pair.refresh_token);
        assert_eq!(store.get(&format!("revoked:{jti}")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let phone_a = ledger.issue(PHONE, "a").await.unwrap();
        let phone_b = ledger.issue(PHONE, "b").await.unwrap();

        ledger.end(PHONE, "a").await.unwrap();

        assert!(ledger.rotate(&phone_a.refresh_token).await.is_err());
        ledger.rotate(&phone_b.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_access_token_cannot_rotate() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(&store);
        let pair = ledger.issue(PHONE, DEVICE).await.unwrap();

        assert!(is_unauthorized(ledger.rotate(&pair.access_token).await));
        assert!(is_unauthorized(ledger.rotate("garbage").await));
    }
}
