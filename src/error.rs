//! Error taxonomy shared by the credential store, session manager, grant
//! registry and the HTTP gateway.
//!
//! Validation and auth failures are expected outcomes returned to the caller.
//! `Internal` wraps store and blob failures; its details are logged and never
//! sent to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Input that can never succeed, regardless of who sends it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid filename '{0}': use 1-50 letters, digits or dots")]
    InvalidFilename(String),
    #[error("can't share a file with yourself")]
    SelfShare,
    #[error("invalid username '{0}': use 1-64 letters, digits, '_' or '-'")]
    InvalidUsername(String),
    #[error("password cannot be empty")]
    EmptyPassword,
    #[error("invalid request: {0}")]
    MalformedRequest(String),
}

/// Identity or permission failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("unknown user")]
    UnknownUser,
    #[error("incorrect password")]
    BadPassword,
    #[error("you don't have access to that file")]
    NoAccess,
    #[error("authentication required")]
    AuthenticationRequired,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Auth(AuthError::NoAccess) => StatusCode::FORBIDDEN,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for JSON bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Auth(AuthError::NoAccess) => "no_access",
            Self::Auth(AuthError::AuthenticationRequired) => "authentication_required",
            Self::Auth(_) => "invalid_credentials",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "request failed");
                "internal server error".to_string()
            }
            // Login failures share one message so usernames can't be probed.
            Self::Auth(AuthError::UnknownUser | AuthError::BadPassword) => {
                "invalid username or password".to_string()
            }
            other => other.to_string(),
        };
        (
            self.status(),
            Json(serde_json::json!({"error": message, "code": self.code()})),
        )
            .into_response()
    }
}
