//! User authentication for the file-sharing service.
//!
//! Provides:
//! - User registration with username/password (PBKDF2-HMAC-SHA256 + 16-byte per-user salt)
//! - Session token management (opaque hex tokens, SHA-256 hashed for storage, time-limited)
//! - The two-variant caller [`Identity`] threaded through every request
//!
//! ## Design Decisions
//! - No JWTs — sessions are opaque random tokens with server-side lookup, so
//!   logout takes effect immediately.
//! - Expired or unknown tokens resolve to `Identity::Anonymous`; they are
//!   never an error on their own.

pub mod credentials;
pub mod identity;
pub mod session;

pub use credentials::CredentialStore;
pub use identity::Identity;
pub use session::{IssuedSession, SessionManager};
