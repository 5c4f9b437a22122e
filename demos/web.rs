/// HTTP server exposing the phone login flow.
///
/// Codes are written to the log by `LogNotifier`, so run with
/// `RUST_LOG=info cargo run --example web` and read the code from the output.
///
/// ```bash
/// curl -X POST localhost:3000/auth/send-otp -H 'content-type: application/json' \
///      -d '{"phone":"+15551234567"}'
/// curl -X POST localhost:3000/auth/verify-otp -H 'content-type: application/json' \
///      -d '{"phone":"+15551234567","otp":"482913"}'
/// curl -X POST localhost:3000/auth/refresh-token -H 'content-type: application/json' \
///      -d '{"refresh_token":"..."}'
/// curl -X POST localhost:3000/auth/me/logout -H 'authorization: Bearer ...'
/// ```
///
/// Set `PHONE_AUTH_TRUST_PROXY=1` when running behind a reverse proxy so the
/// per-client throttles key on `X-Forwarded-For` / `X-Real-IP` instead of the
/// proxy's own address.
use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use phone_auth::{
    AuthConfig, AuthError, ConfigPreset, CredentialService, Operation, TokenPair,
    storage::MemoryStore,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    service: Arc<CredentialService<MemoryStore>>,
    trust_proxy: bool,
}

/// Resolves the caller address used as the throttle identity.
///
/// With `trust_proxy`, prefers the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the socket address.
fn client_ip(headers: &HeaderMap, addr: SocketAddr, trust_proxy: bool) -> IpAddr {
    if !trust_proxy {
        return addr.ip();
    }
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    };
    forwarded.or_else(real_ip).unwrap_or(addr.ip())
}

#[derive(Deserialize)]
struct SendOtpRequest {
    phone: String,
}

#[derive(Deserialize)]
struct VerifyOtpRequest {
    phone: String,
    otp: String,
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

/// Renders an `AuthError` with its mapped status code.
struct ApiError(AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Internal details stay in the log
        let message = if self.0.is_internal() {
            tracing::error!(error = %self.0, "request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: self.0.kind_name(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

async fn send_otp(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let ip = client_ip(&headers, addr, state.trust_proxy);
    state
        .service
        .check_rate(Operation::RequestChallenge, &ip.to_string())
        .await?;
    state.service.request_challenge(&req.phone).await?;
    Ok(Json(MessageResponse {
        message: "OTP sent".to_string(),
    }))
}

async fn verify_otp(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let ip = client_ip(&headers, addr, state.trust_proxy);
    state
        .service
        .check_rate(Operation::ConfirmChallenge, &ip.to_string())
        .await?;
    let pair = state
        .service
        .confirm_challenge(&req.phone, &req.otp, req.device_id.as_deref())
        .await?;
    Ok(Json(pair))
}

async fn refresh_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let ip = client_ip(&headers, addr, state.trust_proxy);
    state
        .service
        .check_rate(Operation::Refresh, &ip.to_string())
        .await?;
    Ok(Json(state.service.refresh(&req.refresh_token).await?))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let claims = state.service.authenticate(authorization).await?;
    state.service.logout(&claims).await?;
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Fall back to the development preset when no secrets are configured
    let config = if std::env::var("PHONE_AUTH_ACCESS_TOKEN_SECRET").is_ok() {
        AuthConfig::from(ConfigPreset::FromEnv)
    } else {
        tracing::warn!("PHONE_AUTH_ACCESS_TOKEN_SECRET not set, using development secrets");
        AuthConfig::from(ConfigPreset::Development)
    };

    let state = AppState {
        service: Arc::new(CredentialService::builder(config).build_and_init().await?),
        trust_proxy: std::env::var("PHONE_AUTH_TRUST_PROXY").is_ok_and(|v| v == "1" || v == "true"),
    };

    let app = Router::new()
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/me/logout", post(logout))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on http://127.0.0.1:3000");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
