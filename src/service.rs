//! The operations the gateway exposes, composed from the credential store,
//! session manager, grant registry and blob store.

use crate::auth::{CredentialStore, Identity, IssuedSession, SessionManager};
use crate::db::Database;
use crate::error::{AuthError, Error, Result};
use crate::grants::{validate_filename, Grant, GrantRegistry};
use crate::storage::BlobStore;

#[derive(Clone)]
pub struct FileShare {
    credentials: CredentialStore,
    sessions: SessionManager,
    grants: GrantRegistry,
    blobs: BlobStore,
}

impl FileShare {
    /// Wire every component to the same database handle.
    pub fn new(db: Database, blobs: BlobStore, session_ttl_secs: u64, hash_iterations: u32) -> Self {
        Self {
            credentials: CredentialStore::new(db.clone(), blobs.clone(), hash_iterations),
            sessions: SessionManager::new(db.clone(), session_ttl_secs),
            grants: GrantRegistry::new(db),
            blobs,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn grants(&self) -> &GrantRegistry {
        &self.grants
    }

    /// Create an account and log it in.
    pub fn register(&self, username: &str, password: &str) -> Result<IssuedSession> {
        self.credentials.register(username, password)?;
        self.sessions.create(username)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<IssuedSession> {
        let identity = self.credentials.verify(username, password)?;
        let username = identity.require()?;
        let session = self.sessions.create(username)?;
        tracing::info!(username, "user logged in");
        Ok(session)
    }

    /// End one session. Unknown tokens are ignored.
    pub fn logout(&self, token: &str) -> Result<()> {
        if self.sessions.revoke(token)? {
            tracing::info!("session revoked");
        }
        Ok(())
    }

    /// End every session of the caller.
    pub fn logout_all(&self, identity: &Identity) -> Result<u64> {
        let username = identity.require()?;
        let revoked = self.sessions.revoke_all(username)?;
        tracing::info!(username, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Store `bytes` as the caller's `filename` and grant the caller access.
    pub fn upload(&self, identity: &Identity, filename: &str, bytes: &[u8]) -> Result<Grant> {
        let owner = identity.require()?;
        validate_filename(filename)?;

        let replacing = self.blobs.contains(owner, filename);
        self.blobs.write(owner, filename, bytes)?;
        match self.grants.grant_self(owner, filename) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(owner, filename, "re-upload replaced existing file"),
            Err(e) => {
                // A blob with no grant is unreachable; don't leave one behind.
                if !replacing {
                    if let Err(rm) = self.blobs.remove(owner, filename) {
                        tracing::warn!(owner, filename, error = %rm, "failed to remove orphaned blob");
                    }
                }
                return Err(e);
            }
        }

        tracing::info!(owner, filename, size = bytes.len(), "file uploaded");
        Ok(Grant {
            recipient: owner.to_string(),
            owner: owner.to_string(),
            filename: filename.to_string(),
        })
    }

    pub fn list_files(&self, identity: &Identity) -> Result<Vec<Grant>> {
        let username = identity.require()?;
        self.grants.list_accessible(username)
    }

    /// Read a file the caller holds a grant for.
    ///
    /// A missing grant and a missing file look the same to the caller.
    pub fn download(&self, identity: &Identity, owner: &str, filename: &str) -> Result<Vec<u8>> {
        let username = identity.require()?;
        if !self.grants.check_access(username, owner, filename)? {
            tracing::warn!(username, owner, filename, "download denied");
            return Err(AuthError::NoAccess.into());
        }

        match self.blobs.read(owner, filename)? {
            Some(bytes) => Ok(bytes),
            None => {
                tracing::error!(owner, filename, "grant exists but blob is missing");
                Err(Error::NotFound(format!("file {filename}")))
            }
        }
    }

    /// Pass the caller's access to `filename` on to `recipient`.
    ///
    /// A caller without access gets `NoAccess` whether or not the recipient
    /// exists.
    pub fn share(&self, identity: &Identity, recipient: &str, filename: &str) -> Result<Grant> {
        let sender = identity.require()?;
        self.grants.share(sender, recipient, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use tempfile::TempDir;

    fn test_service() -> (TempDir, FileShare) {
        let (tmp, _db, svc) = test_service_with_db();
        (tmp, svc)
    }

    fn test_service_with_db() -> (TempDir, Database, FileShare) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(&tmp.path().join("fileshare.db")).unwrap();
        let blobs = BlobStore::new(tmp.path().join("files")).unwrap();
        let svc = FileShare::new(db.clone(), blobs, 3600, 1);
        (tmp, db, svc)
    }

    fn login(svc: &FileShare, username: &str, password: &str) -> Identity {
        let session = svc.login(username, password).unwrap();
        Identity::from(svc.sessions().resolve(&session.token))
    }

    #[test]
    fn register_returns_live_session() {
        let (_tmp, svc) = test_service();

        let session = svc.register("alice", "pw1").unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(svc.sessions().resolve(&session.token).as_deref(), Some("alice"));
    }

    #[test]
    fn login_with_wrong_password_fails() {
        let (_tmp, svc) = test_service();
        svc.register("alice", "pw1").unwrap();

        let err = svc.login("alice", "nope").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::BadPassword)));
    }

    #[test]
    fn logout_revokes_only_that_session() {
        let (_tmp, svc) = test_service();
        let first = svc.register("alice", "pw1").unwrap();
        let second = svc.login("alice", "pw1").unwrap();

        svc.logout(&first.token).unwrap();
        svc.logout(&first.token).unwrap();
        assert_eq!(svc.sessions().resolve(&first.token), None);
        assert_eq!(svc.sessions().resolve(&second.token).as_deref(), Some("alice"));
    }

    #[test]
    fn logout_all_requires_identity() {
        let (_tmp, svc) = test_service();
        svc.register("alice", "pw1").unwrap();

        let err = svc.logout_all(&Identity::Anonymous).unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::AuthenticationRequired)));
        assert_eq!(svc.logout_all(&Identity::identified("alice")).unwrap(), 1);
    }

    #[test]
    fn anonymous_callers_are_rejected() {
        let (_tmp, svc) = test_service();
        let anon = Identity::Anonymous;

        for err in [
            svc.upload(&anon, "x.txt", b"x").unwrap_err(),
            svc.list_files(&anon).unwrap_err(),
            svc.download(&anon, "alice", "x.txt").unwrap_err(),
            svc.share(&anon, "bob", "x.txt").unwrap_err(),
        ] {
            assert!(matches!(err, Error::Auth(AuthError::AuthenticationRequired)));
        }
    }

    #[test]
    fn invalid_upload_touches_nothing() {
        let (tmp, svc) = test_service();
        svc.register("alice", "pw1").unwrap();
        let alice = login(&svc, "alice", "pw1");

        let long = "a".repeat(51);
        for name in ["../x", "a/b", long.as_str()] {
            let err = svc.upload(&alice, name, b"data").unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::InvalidFilename(_))));
        }
        assert!(svc.list_files(&alice).unwrap().is_empty());
        let entries = std::fs::read_dir(tmp.path().join("files").join("alice")).unwrap();
        assert_eq!(entries.count(), 0);
    }

    #[test]
    fn share_with_unknown_user_is_not_found() {
        let (_tmp, svc) = test_service();
        svc.register("alice", "pw1").unwrap();
        let alice = login(&svc, "alice", "pw1");
        svc.upload(&alice, "x.txt", b"hi").unwrap();

        let err = svc.share(&alice, "nobody", "x.txt").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn share_without_access_hides_which_users_exist() {
        let (_tmp, svc) = test_service();
        svc.register("mallory", "pw1").unwrap();
        svc.register("bob", "pw2").unwrap();
        let mallory = login(&svc, "mallory", "pw1");

        let known = svc.share(&mallory, "bob", "nothing.txt").unwrap_err();
        let unknown = svc.share(&mallory, "ghost", "nothing.txt").unwrap_err();
        assert!(matches!(known, Error::Auth(AuthError::NoAccess)));
        assert!(matches!(unknown, Error::Auth(AuthError::NoAccess)));
    }

    #[test]
    fn failed_grant_leaves_no_orphan_blob() {
        let (tmp, db, svc) = test_service_with_db();
        svc.register("alice", "pw1").unwrap();
        let alice = login(&svc, "alice", "pw1");
        db.lock().execute_batch("DROP TABLE files").unwrap();

        let err = svc.upload(&alice, "x.txt", b"hi").unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(!tmp.path().join("files").join("alice").join("x.txt").exists());
    }

    #[test]
    fn download_denied_looks_the_same_for_missing_files() {
        let (_tmp, svc) = test_service();
        svc.register("alice", "pw1").unwrap();
        svc.register("bob", "pw2").unwrap();
        let alice = login(&svc, "alice", "pw1");
        let bob = login(&svc, "bob", "pw2");
        svc.upload(&alice, "x.txt", b"hi").unwrap();

        let exists = svc.download(&bob, "alice", "x.txt").unwrap_err();
        let missing = svc.download(&bob, "alice", "nothing.txt").unwrap_err();
        assert!(matches!(exists, Error::Auth(AuthError::NoAccess)));
        assert!(matches!(missing, Error::Auth(AuthError::NoAccess)));
    }

    #[test]
    fn reupload_replaces_bytes() {
        let (_tmp, svc) = test_service();
        svc.register("alice", "pw1").unwrap();
        let alice = login(&svc, "alice", "pw1");

        svc.upload(&alice, "x.txt", b"v1").unwrap();
        svc.upload(&alice, "x.txt", b"v2").unwrap();
        assert_eq!(svc.download(&alice, "alice", "x.txt").unwrap(), b"v2");
        assert_eq!(svc.list_files(&alice).unwrap().len(), 1);
    }
}
