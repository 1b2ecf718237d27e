//! Axum-based HTTP gateway for the file-sharing service.
//!
//! Every route sits behind the [`gate::access_gate`] middleware, which
//! attaches the caller's identity, logs the request, and turns handler panics
//! into a generic 500. Routes that need a logged-in user check for it
//! themselves.

pub mod gate;

use crate::auth::{Identity, IssuedSession};
use crate::config::{Config, GatewayConfig};
use crate::db::Database;
use crate::error::{Error, ValidationError};
use crate::service::FileShare;
use crate::storage::BlobStore;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{AppendHeaders, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub service: FileShare,
    /// Add `Secure` to session cookies.
    pub secure_cookies: bool,
}

/// Open the store, wire the service, and serve until Ctrl-C.
pub async fn run_gateway(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!("create data dir {}", config.storage.data_dir.display())
    })?;
    let db = Database::open(&config.db_path())?;
    let blobs = BlobStore::new(config.files_dir())?;
    let service = FileShare::new(
        db,
        blobs,
        config.auth.session_ttl_secs,
        config.auth.hash_iterations,
    );
    let state = AppState {
        service,
        secure_cookies: config.gateway.secure_cookies,
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        data_dir = %config.storage.data_dir.display(),
        "fileshare gateway listening"
    );

    let app = build_router(state, &config.gateway);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/logout", post(handle_logout))
        .route("/api/auth/logout-all", post(handle_logout_all))
        .route("/api/auth/me", get(handle_me))
        .route("/api/files", get(handle_list_files).post(handle_upload))
        .route("/api/files/{owner}/{filename}", get(handle_download))
        .route("/api/share", post(handle_share))
        .layer(middleware::from_fn_with_state(state.clone(), gate::access_gate))
        .with_state(state)
        .layer(DefaultBodyLimit::max(gateway.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(gateway.max_upload_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        ))
}

// ══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

type ApiResult = Result<Response, Error>;

/// Request body for registration and login.
#[derive(Deserialize)]
struct CredentialsBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct ShareBody {
    /// Recipient.
    username: String,
    filename: String,
}

fn parse_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    body.map(|Json(b)| b)
        .map_err(|e| ValidationError::MalformedRequest(e.body_text()).into())
}

fn with_session(state: &AppState, status: StatusCode, session: &IssuedSession, label: &str) -> Response {
    (
        status,
        AppendHeaders([(header::SET_COOKIE, gate::session_cookie(session, state.secure_cookies))]),
        Json(serde_json::json!({
            "status": label,
            "username": session.username,
            "expires_at": session.expires_at.to_rfc3339(),
        })),
    )
        .into_response()
}

fn cleared_session(state: &AppState, body: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        AppendHeaders([(header::SET_COOKIE, gate::clear_session_cookie(state.secure_cookies))]),
        Json(body),
    )
        .into_response()
}

/// GET /health
async fn handle_health(State(state): State<AppState>) -> ApiResult {
    let users = state.service.credentials().user_count()?;
    Ok(Json(serde_json::json!({"status": "ok", "users": users})).into_response())
}

/// POST /api/auth/register — create an account and start a session.
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult {
    let body = parse_json(body)?;
    let session = state.service.register(&body.username, &body.password)?;
    Ok(with_session(&state, StatusCode::CREATED, &session, "registered"))
}

/// POST /api/auth/login
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult {
    let body = parse_json(body)?;
    let session = state.service.login(&body.username, &body.password)?;
    Ok(with_session(&state, StatusCode::OK, &session, "authenticated"))
}

/// POST /api/auth/logout — revoke the presented session and clear the cookie.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    if let Some(token) = gate::extract_session_token(&headers) {
        state.service.logout(&token)?;
    }
    Ok(cleared_session(&state, serde_json::json!({"status": "logged_out"})))
}

/// POST /api/auth/logout-all — revoke every session of the caller.
async fn handle_logout_all(State(state): State<AppState>, identity: Identity) -> ApiResult {
    let revoked = state.service.logout_all(&identity)?;
    Ok(cleared_session(
        &state,
        serde_json::json!({"status": "logged_out", "revoked": revoked}),
    ))
}

/// GET /api/auth/me
async fn handle_me(identity: Identity) -> impl IntoResponse {
    Json(serde_json::json!({"identity": identity}))
}

/// GET /api/files — every file the caller may view.
async fn handle_list_files(State(state): State<AppState>, identity: Identity) -> ApiResult {
    let files: Vec<_> = state
        .service
        .list_files(&identity)?
        .into_iter()
        .map(|grant| {
            serde_json::json!({
                "path": format!("/api/files/{}/{}", grant.owner, grant.filename),
                "filename": grant.filename,
                "owner": grant.owner,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({"files": files})).into_response())
}

/// POST /api/files — multipart upload, field `file`.
async fn handle_upload(
    State(state): State<AppState>,
    identity: Identity,
    mut multipart: Multipart,
) -> ApiResult {
    // Don't read the body for anonymous callers.
    identity.require()?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ValidationError::MalformedRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ValidationError::MalformedRequest(e.body_text()))?;

        let grant = state.service.upload(&identity, &filename, &bytes)?;
        return Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "status": "uploaded",
                "filename": grant.filename,
                "owner": grant.owner,
                "size": bytes.len(),
            })),
        )
            .into_response());
    }

    Err(ValidationError::MalformedRequest("missing multipart field 'file'".into()).into())
}

/// GET /api/files/{owner}/{filename}
async fn handle_download(
    State(state): State<AppState>,
    identity: Identity,
    Path((owner, filename)): Path<(String, String)>,
) -> ApiResult {
    let bytes = state.service.download(&identity, &owner, &filename)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/share — give another user access to a file you can view.
async fn handle_share(
    State(state): State<AppState>,
    identity: Identity,
    body: Result<Json<ShareBody>, JsonRejection>,
) -> ApiResult {
    identity.require()?;
    let body = parse_json(body)?;
    let grant = state.service.share(&identity, &body.username, &body.filename)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "shared",
            "recipient": grant.recipient,
            "owner": grant.owner,
            "filename": grant.filename,
        })),
    )
        .into_response())
}
