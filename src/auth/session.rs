//! Server-side sessions.
//!
//! Tokens are 16 random bytes rendered as 32 hex characters. Only the SHA-256
//! digest of a token is stored, so a leaked database can't be replayed as
//! cookies. A session is `Active` until `now >= expires_at` or an explicit
//! revoke; after that it resolves to nobody. Expired rows are deleted the
//! first time they are read.

use crate::db::Database;
use crate::error::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Token byte length before hex encoding (16 bytes = 32 hex chars).
pub const TOKEN_BYTES: usize = 16;

/// Default session duration: 24 hours (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 3600;

/// A freshly issued session. The plaintext token is only ever seen here.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(db: Database, ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self { db, ttl }
    }

    /// Issue a session for an already-verified user.
    pub fn create(&self, username: &str) -> Result<IssuedSession> {
        let token = generate_token();
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.db.lock().execute(
            "INSERT INTO sessions (username, token_hash, expires_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![username, hash_token(&token), expires_at.timestamp()],
        )?;

        tracing::debug!(username, expires_at = %expires_at, "session created");
        Ok(IssuedSession {
            token,
            username: username.to_string(),
            expires_at,
        })
    }

    /// The username bound to `token`, or `None` when the token is unknown,
    /// revoked, or expired.
    pub fn resolve(&self, token: &str) -> Option<String> {
        self.resolve_at(token, Utc::now())
    }

    /// [`resolve`](Self::resolve) against an explicit clock reading.
    pub fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let row = self.db.lock().query_row(
            "SELECT username, expires_at FROM sessions WHERE token_hash = ?1",
            rusqlite::params![hash_token(token)],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        );

        let (username, expires_at) = match row {
            Ok(found) => found,
            Err(rusqlite::Error::QueryReturnedNoRows) => return None,
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed");
                return None;
            }
        };

        if Utc.timestamp_opt(expires_at, 0).single().is_some_and(|at| now < at) {
            return Some(username);
        }

        tracing::debug!(username, "session expired");
        if let Err(e) = self.db.lock().execute(
            "DELETE FROM sessions WHERE token_hash = ?1 AND expires_at <= ?2",
            rusqlite::params![hash_token(token), now.timestamp()],
        ) {
            tracing::warn!(error = %e, "failed to delete expired session");
        }
        None
    }

    /// Delete the session for `token`. Unknown tokens are not an error.
    /// Returns whether a row was removed.
    pub fn revoke(&self, token: &str) -> Result<bool> {
        let deleted = self.db.lock().execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            rusqlite::params![hash_token(token)],
        )?;
        Ok(deleted > 0)
    }

    /// Revoke all sessions for a user.
    pub fn revoke_all(&self, username: &str) -> Result<u64> {
        let deleted = self.db.lock().execute(
            "DELETE FROM sessions WHERE username = ?1",
            rusqlite::params![username],
        )?;
        Ok(deleted as u64)
    }
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a session token (SHA-256, single pass — tokens are already high-entropy).
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
