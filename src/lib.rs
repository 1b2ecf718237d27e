//! Multi-user file sharing with server-side sessions and per-file viewing
//! grants.
//!
//! The pieces, leaf first:
//! - [`auth::CredentialStore`] registers users and verifies passwords.
//! - [`auth::SessionManager`] issues, resolves and revokes session tokens.
//! - [`gateway::gate`] turns a request's token into an [`auth::Identity`].
//! - [`grants::GrantRegistry`] records who may view which `(owner, filename)`.
//!
//! [`service::FileShare`] composes them into the operations the HTTP gateway
//! exposes.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod grants;
pub mod service;
pub mod storage;

pub use auth::Identity;
pub use config::Config;
pub use error::{AuthError, Error, ValidationError};
pub use service::FileShare;
