//! File access control.
//!
//! A grant lets one user view one `(owner, filename)` file. Uploading gives
//! the uploader a self-grant; sharing copies an existing grant to another
//! user. Grants are never revoked.

pub mod filename;
pub mod registry;

pub use filename::{validate_filename, MAX_FILENAME_LEN};
pub use registry::{Grant, GrantRegistry};
