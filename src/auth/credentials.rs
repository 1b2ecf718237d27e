//! User registration and password verification.

use super::Identity;
use crate::db::{is_constraint_violation, Database};
use crate::error::{AuthError, Error, Result, ValidationError};
use crate::storage::BlobStore;
use constant_time_eq::constant_time_eq;
use rand::RngCore;
use sha2::Sha256;

/// Salt byte length for password hashing.
pub const SALT_BYTES: usize = 16;

/// PBKDF2 output length (SHA-256 digest size).
const HASH_BYTES: usize = 32;

/// Default PBKDF2-HMAC-SHA256 rounds.
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;

/// Maximum username length.
const MAX_USERNAME_LEN: usize = 64;

/// SQLite-backed credential store. Also owns each user's blob directory.
#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
    blobs: BlobStore,
    hash_iterations: u32,
}

impl CredentialStore {
    pub fn new(db: Database, blobs: BlobStore, hash_iterations: u32) -> Self {
        Self {
            db,
            blobs,
            hash_iterations: hash_iterations.max(1),
        }
    }

    /// Register a new user and provision their storage directory.
    ///
    /// The unique index on `users.username` decides duplicates, so two
    /// concurrent registrations of one name yield exactly one `Conflict`.
    pub fn register(&self, username: &str, password: &str) -> Result<()> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        let salt = generate_salt();
        let password_hash = hash_password(password, &salt, self.hash_iterations);
        let now = chrono::Utc::now().timestamp();

        let inserted = self.db.lock().execute(
            "INSERT INTO users (username, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![username, password_hash.as_slice(), salt.as_slice(), now],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::Conflict(format!("username {username} already exists")));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.blobs.provision(username) {
            // Don't leave a user behind without somewhere to upload to.
            if let Err(cleanup) = self.db.lock().execute(
                "DELETE FROM users WHERE username = ?1",
                rusqlite::params![username],
            ) {
                tracing::warn!(username, error = %cleanup, "failed to roll back user row");
            }
            return Err(e.into());
        }

        tracing::info!(username, "user registered");
        Ok(())
    }

    /// Check a username/password pair.
    pub fn verify(&self, username: &str, password: &str) -> Result<Identity> {
        let row = self.db.lock().query_row(
            "SELECT password_hash, salt FROM users WHERE username = ?1",
            rusqlite::params![username],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
        );

        match row {
            Ok((stored_hash, salt)) => {
                let attempt = hash_password(password, &salt, self.hash_iterations);
                if !constant_time_eq(&stored_hash, &attempt) {
                    tracing::debug!(username, "password mismatch");
                    return Err(AuthError::BadPassword.into());
                }
                Ok(Identity::identified(username))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                // Perform dummy hash to prevent timing side-channel
                let _ = hash_password(password, &[0u8; SALT_BYTES], self.hash_iterations);
                Err(AuthError::UnknownUser.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .lock()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Usernames double as directory names, so keep them to a safe alphabet.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let ok = !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(username.to_string()))
    }
}

fn generate_salt() -> [u8; SALT_BYTES] {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

fn hash_password(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, CredentialStore) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(&tmp.path().join("fileshare.db")).unwrap();
        let blobs = BlobStore::new(tmp.path().join("files")).unwrap();
        (tmp, CredentialStore::new(db, blobs, 1_000))
    }

    #[test]
    fn register_and_verify() {
        let (_tmp, store) = test_store();

        store.register("alice", "pw1").unwrap();
        let identity = store.verify("alice", "pw1").unwrap();
        assert_eq!(identity, Identity::identified("alice"));
    }

    #[test]
    fn register_provisions_directory() {
        let (tmp, store) = test_store();

        store.register("alice", "pw1").unwrap();
        assert!(tmp.path().join("files").join("alice").is_dir());
    }

    #[test]
    fn register_duplicate_username_conflicts() {
        let (_tmp, store) = test_store();

        store.register("alice", "pw1").unwrap();
        let err = store.register("alice", "something-else").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let (_tmp, store) = test_store();

        store.register("Alice", "pw1").unwrap();
        store.register("alice", "pw2").unwrap();
        assert_eq!(store.user_count().unwrap(), 2);
        assert!(store.verify("ALICE", "pw1").is_err());
    }

    #[test]
    fn verify_wrong_password_fails() {
        let (_tmp, store) = test_store();

        store.register("alice", "pw1").unwrap();
        let err = store.verify("alice", "pw2").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::BadPassword)));
    }

    #[test]
    fn verify_unknown_user_fails() {
        let (_tmp, store) = test_store();

        let err = store.verify("ghost", "anything").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UnknownUser)));
    }

    #[test]
    fn register_rejects_bad_usernames() {
        let (_tmp, store) = test_store();

        let too_long = "x".repeat(65);
        for bad in ["", "../etc", "a/b", "with space", too_long.as_str()] {
            let err = store.register(bad, "pw").unwrap_err();
            assert!(
                matches!(err, Error::Validation(ValidationError::InvalidUsername(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn register_rejects_empty_password() {
        let (_tmp, store) = test_store();

        let err = store.register("alice", "").unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyPassword)));
        assert_eq!(store.user_count().unwrap(), 0);
    }

    #[test]
    fn salts_differ_per_user() {
        let (_tmp, store) = test_store();

        store.register("alice", "same").unwrap();
        store.register("bob", "same").unwrap();
        let conn = store.db.lock();
        let hashes: Vec<Vec<u8>> = conn
            .prepare("SELECT password_hash FROM users ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_ne!(hashes[0], hashes[1]);
    }

    #[test]
    fn password_hash_is_deterministic_with_same_salt() {
        let h1 = hash_password("test_password", b"fixed_salt_value", 10);
        let h2 = hash_password("test_password", b"fixed_salt_value", 10);
        assert_eq!(h1, h2);
    }

    #[test]
    fn password_hash_differs_with_different_salt() {
        let h1 = hash_password("test_password", b"salt_a", 10);
        let h2 = hash_password("test_password", b"salt_b", 10);
        assert_ne!(h1, h2);
    }
}
