//! Access gate: the request boundary.
//!
//! Resolves the caller's [`Identity`] from the `session_token` cookie (or an
//! `Authorization: Bearer` header) and stores it in the request extensions.
//! The gate never rejects a request; handlers decide what needs a user.
//! It is also the per-request panic boundary and the request logger.

use super::AppState;
use crate::auth::{Identity, IssuedSession};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::FutureExt;
use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

pub const SESSION_COOKIE: &str = "session_token";

pub async fn access_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let peer = remote_addr(&request).map_or_else(|| "-".to_string(), |a| a.to_string());

    let handled = AssertUnwindSafe(async move {
        let identity = resolve_identity(&state, request.headers());
        let user = identity.username().unwrap_or("-").to_owned();
        let mut request = request;
        request.extensions_mut().insert(identity);
        (next.run(request).await, user)
    })
    .catch_unwind()
    .await;

    let (response, user) = match handled {
        Ok(done) => done,
        Err(panic) => {
            tracing::error!(
                target: "panic",
                %method,
                path = %path,
                remote_addr = %peer,
                "request handler panicked: {}",
                panic_message(panic.as_ref())
            );
            (internal_error_response(), "-".to_owned())
        }
    };

    tracing::info!(
        %method,
        path = %path,
        remote_addr = %peer,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        user = %user,
        "handled request"
    );
    response
}

/// Peer address, present when served with connect info.
fn remote_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Identity {
    match extract_session_token(headers) {
        Some(token) => Identity::from(state.service.sessions().resolve(&token)),
        None => Identity::Anonymous,
    }
}

/// Handlers take `identity: Identity` directly. Without the gate in front,
/// every caller is anonymous.
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Identity>()
            .cloned()
            .unwrap_or(Identity::Anonymous))
    }
}

/// Session token from the cookie, falling back to a bearer header.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
    })
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

/// `Set-Cookie` value for a new session: strict same-site, absolute expiry,
/// hidden from scripts.
pub fn session_cookie(session: &IssuedSession, secure: bool) -> String {
    format!(
        "{SESSION_COOKIE}={}; Expires={}; Path=/; HttpOnly; SameSite=Strict{}",
        session.token,
        session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub fn clear_session_cookie(secure: bool) -> String {
    format!(
        "{SESSION_COOKIE}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; SameSite=Strict{}",
        if secure { "; Secure" } else { "" }
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic"
    }
}

fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "internal server error",
            "code": "internal_error",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::{TimeZone, Utc};

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn remote_addr_comes_from_connect_info() {
        let addr: SocketAddr = "203.0.113.7:41000".parse().unwrap();
        let mut request = Request::new(axum::body::Body::empty());
        assert_eq!(remote_addr(&request), None);

        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(remote_addr(&request), Some(addr));
    }

    #[test]
    fn token_from_cookie() {
        let headers = headers_with(header::COOKIE, "theme=dark; session_token=abc123; lang=en");
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn token_from_bearer_header() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer abc123");
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = headers_with(header::COOKIE, "session_token=from-cookie");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn missing_or_empty_token_is_none() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
        let headers = headers_with(header::COOKIE, "session_token=; other=1");
        assert_eq!(extract_session_token(&headers), None);
        let headers = headers_with(header::COOKIE, "my_session_token=abc");
        assert_eq!(extract_session_token(&headers), None);
        let headers = headers_with(header::AUTHORIZATION, "Basic abc");
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_cookie_is_strict_and_absolute() {
        let session = IssuedSession {
            token: "deadbeef".into(),
            username: "alice".into(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        };
        let cookie = session_cookie(&session, false);
        assert!(cookie.starts_with("session_token=deadbeef;"));
        assert!(cookie.contains("Expires=Wed, 02 Jan 2030 03:04:05 GMT"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));
        assert!(session_cookie(&session, true).ends_with("; Secure"));
    }

    #[test]
    fn cleared_cookie_is_already_expired() {
        let cookie = clear_session_cookie(false);
        assert!(cookie.starts_with("session_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "panic");
    }
}
