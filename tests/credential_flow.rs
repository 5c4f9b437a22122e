//! End-to-end credential flows against the in-memory store.
//!
//! Run with: cargo test --test credential_flow

use async_trait::async_trait;
use phone_auth::storage::{KeyValueStore, MemoryStore};
use phone_auth::{AuthConfig, AuthError, Challenge, CredentialService, Notifier, TokenPair};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const PHONE: &str = "+15551234567";

#[derive(Default, Clone)]
struct Inbox(Arc<Mutex<Vec<Challenge>>>);

#[async_trait]
impl Notifier for Inbox {
    async fn notify(&self, challenge: &Challenge) -> Result<(), AuthError> {
        self.0.lock().await.push(challenge.clone());
        Ok(())
    }
}

impl Inbox {
    async fn latest_code(&self) -> String {
        self.0
            .lock()
            .await
            .last()
            .map(|challenge| challenge.code.clone())
            .unwrap_or_default()
    }
}

async fn setup() -> (CredentialService<MemoryStore>, Inbox) {
    let inbox = Inbox::default();
    let service = CredentialService::builder(AuthConfig::testing())
        .with_notifier(inbox.clone())
        .build_and_init()
        .await
        .unwrap();
    (service, inbox)
}

async fn login(service: &CredentialService<MemoryStore>, inbox: &Inbox) -> TokenPair {
    service.request_challenge(PHONE).await.unwrap();
    service
        .confirm_challenge(PHONE, &inbox.latest_code().await, None)
        .await
        .unwrap()
}

fn wrong_code(code: &str) -> String {
    if code == "000000" { "999999" } else { "000000" }.to_string()
}

#[tokio::test]
async fn test_scenario_request_confirm_refresh() {
    let (service, _) = setup().await;

    service.request_challenge(PHONE).await.unwrap();

    let stored = service.store().get("otp:+15551234567").await.unwrap().unwrap();
    let mut challenge: Challenge = serde_json::from_str(&stored).unwrap();
    assert_eq!(challenge.phone, PHONE);

    // Pin the code so the scenario reads the same every run
    challenge.code = "482913".to_string();
    service
        .store()
        .set(
            "otp:+15551234567",
            &serde_json::to_string(&challenge).unwrap(),
            Duration::from_secs(300),
        )
        .await
        .unwrap();

    let pair = service
        .confirm_challenge(PHONE, "482913", None)
        .await
        .unwrap();
    assert!(!pair.access_token.is_empty());
    assert!(!pair.refresh_token.is_empty());
    assert!(uuid::Uuid::parse_str(&pair.device_id).is_ok());

    let rotated = service.refresh(&pair.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);
    assert_eq!(rotated.device_id, pair.device_id);

    assert!(matches!(
        service.refresh(&pair.refresh_token).await,
        Err(AuthError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_challenge_redeems_exactly_once() {
    let (service, inbox) = setup().await;

    service.request_challenge(PHONE).await.unwrap();
    let code = inbox.latest_code().await;

    service.confirm_challenge(PHONE, &code, None).await.unwrap();
    let second = service.confirm_challenge(PHONE, &code, None).await;
    assert!(matches!(
        second,
        Err(AuthError::Gone(_)) | Err(AuthError::Invalid(_))
    ));
}

#[tokio::test]
async fn test_sixth_attempt_is_locked_out() {
    let (service, inbox) = setup().await;

    service.request_challenge(PHONE).await.unwrap();
    let code = inbox.latest_code().await;
    let wrong = wrong_code(&code);

    for _ in 0..5 {
        assert!(matches!(
            service.confirm_challenge(PHONE, &wrong, None).await,
            Err(AuthError::Invalid(_))
        ));
    }

    let locked = service.confirm_challenge(PHONE, &code, None).await;
    assert!(matches!(locked, Err(AuthError::TooManyRequests(_))));
}

#[tokio::test]
async fn test_replay_revokes_descendant_token() {
    let (service, inbox) = setup().await;
    let r0 = login(&service, &inbox).await.refresh_token;

    let r1 = service.refresh(&r0).await.unwrap().refresh_token;

    assert!(matches!(
        service.refresh(&r0).await,
        Err(AuthError::Unauthorized(_))
    ));
    assert!(matches!(
        service.refresh(&r1).await,
        Err(AuthError::Unauthorized(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_single_winner() {
    let (service, inbox) = setup().await;
    let service = Arc::new(service);
    let pair = login(&service, &inbox).await;

    let (a, b) = tokio::join!(
        {
            let service = Arc::clone(&service);
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        },
        {
            let service = Arc::clone(&service);
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        }
    );

    let results = [a.unwrap(), b.unwrap()];
    let winners: Vec<&TokenPair> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AuthError::Unauthorized(_)))
    );

    let session_key = format!("refresh:{PHONE}:{}", pair.device_id);
    let stored = service.store().get(&session_key).await.unwrap();
    assert_eq!(stored.as_deref(), Some(winners[0].refresh_token.as_str()));
}

#[tokio::test]
async fn test_logout_then_refresh_fails() {
    let (service, inbox) = setup().await;
    let pair = login(&service, &inbox).await;

    let claims = service
        .authenticate(Some(&format!("Bearer {}", pair.access_token)))
        .await
        .unwrap();
    service.logout(&claims).await.unwrap();

    assert!(matches!(
        service.refresh(&pair.refresh_token).await,
        Err(AuthError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_instances_sharing_a_store_share_sessions() {
    let store = Arc::new(MemoryStore::new());
    let inbox = Inbox::default();
    let first = CredentialService::builder(AuthConfig::testing())
        .with_store(Arc::clone(&store))
        .with_notifier(inbox.clone())
        .build_and_init()
        .await
        .unwrap();
    let second = CredentialService::builder(AuthConfig::testing())
        .with_store(Arc::clone(&store))
        .build_and_init()
        .await
        .unwrap();

    first.request_challenge(PHONE).await.unwrap();
    let pair = second
        .confirm_challenge(PHONE, &inbox.latest_code().await, Some("tablet"))
        .await
        .unwrap();

    first.refresh(&pair.refresh_token).await.unwrap();
    assert!(second.refresh(&pair.refresh_token).await.is_err());
}

#[tokio::test]
async fn test_error_kinds_map_to_http_status() {
    let (service, _) = setup().await;

    let bad_phone = service.request_challenge("12").await.unwrap_err();
    assert_eq!(bad_phone.status_code(), 400);

    let gone = service
        .confirm_challenge(PHONE, "123456", None)
        .await
        .unwrap_err();
    assert_eq!(gone.status_code(), 410);

    let unauthorized = service.authenticate(None).await.unwrap_err();
    assert_eq!(unauthorized.status_code(), 401);
}
