use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::{Config, CorsSettings};
use crate::security::audit_log::AuditLogger;
use crate::security::issuer::{IssuedToken, TokenIssuer};
use crate::security::verifier::{Rejection, TokenVerifier, Verification, VerifiedClaims};

type SharedState = Arc<AppState>;

// Client IP for the audit trail: connect info first, then proxy headers.
#[derive(Debug, Clone)]
struct ClientIp(pub Option<String>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientIp(Some(addr.ip().to_string())));
        }

        if let Some(forwarded) = parts.headers.get("x-forwarded-for") {
            if let Ok(s) = forwarded.to_str() {
                let ip = s.split(',').next().unwrap_or(s).trim();
                if !ip.is_empty() {
                    return Ok(ClientIp(Some(ip.to_string())));
                }
            }
        }

        Ok(ClientIp(None))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub issuer: TokenIssuer,
    pub verifier: TokenVerifier,
    pub audit: AuditLogger,
    pub cors: CorsSettings,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            issuer: TokenIssuer::new(&config.token),
            verifier: TokenVerifier::new(&config.token),
            audit: AuditLogger::new(),
            cors: config.cors.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct VerifySuccess<'a> {
    success: bool,
    #[serde(flatten)]
    claims: &'a VerifiedClaims,
}

#[derive(Serialize)]
struct VerifyFailure {
    success: bool,
    message: String,
}

/// What the verify body carried in its `token` field.
#[derive(Debug, PartialEq, Eq)]
enum TokenField {
    Missing,
    Present(String),
    /// Present but not a string, so it can never be a valid token.
    NotAString,
}

fn is_json(headers: &HeaderMap) -> bool {
    let Some(ct) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

// Bodies that are not a JSON object are read as `{}`.
fn token_field(headers: &HeaderMap, body: &[u8]) -> TokenField {
    if !is_json(headers) {
        return TokenField::Missing;
    }
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(body) else {
        return TokenField::Missing;
    };
    match map.remove("token") {
        None => TokenField::Missing,
        Some(v) if is_blank(&v) => TokenField::Missing,
        Some(Value::String(s)) => TokenField::Present(s),
        Some(_) => TokenField::NotAString,
    }
}

pub fn rejection_status(rejection: Rejection) -> StatusCode {
    match rejection {
        Rejection::MissingToken => StatusCode::BAD_REQUEST,
        Rejection::Expired | Rejection::InvalidIssuer | Rejection::Malformed => {
            StatusCode::UNAUTHORIZED
        }
    }
}

// Liveness probe
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Issue a fresh QR token. Multi-use until it expires.
async fn issue_token(
    State(state): State<SharedState>,
) -> Result<Json<IssuedToken>, (StatusCode, Json<ErrorResponse>)> {
    match state.issuer.issue() {
        Ok(issued) => {
            state.audit.token_issued(&issued.claims.jti, issued.claims.exp);
            Ok(Json(issued))
        }
        Err(e) => {
            state.audit.internal_error(&e.to_string());
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to issue token".to_string(),
                }),
            ))
        }
    }
}

// Verify a scanned token. The token is not consumed.
async fn verify_token(
    State(state): State<SharedState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let verification = match token_field(&headers, &body) {
        TokenField::Missing => state.verifier.verify(None),
        TokenField::Present(token) => state.verifier.verify(Some(&token)),
        TokenField::NotAString => {
            debug!("verify body carried a non-string token");
            Verification::Rejected(Rejection::Malformed)
        }
    };

    match verification {
        Verification::Accepted(claims) => {
            state
                .audit
                .token_accepted(claims.token_id.as_deref(), claims.expires_at);
            (
                StatusCode::OK,
                Json(VerifySuccess {
                    success: true,
                    claims: &claims,
                }),
            )
                .into_response()
        }
        Verification::Rejected(rejection) => {
            state.audit.token_rejected(client_ip.as_deref(), rejection);
            (
                rejection_status(rejection),
                Json(VerifyFailure {
                    success: false,
                    message: rejection.to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let settings = settings.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().map(|o| settings.allows(o)).unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn create_router(state: SharedState) -> Router {
    let qr = Router::new()
        .route("/token", get(issue_token))
        .route("/verify", post(verify_token))
        .layer(cors_layer(&state.cors));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/qr", qr)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub async fn serve(config: &Config, host: IpAddr, port: u16) -> Result<()> {
    let state = Arc::new(AppState::new(config));
    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::new(host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        issuer = %config.token.issuer,
        lifetime_secs = config.token.lifetime_secs,
        "HTTP server listening on {}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
