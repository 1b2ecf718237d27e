use super::validate_filename;
use crate::db::{is_constraint_violation, Database};
use crate::error::{AuthError, Error, Result, ValidationError};
use serde::Serialize;

/// "`recipient` may view `filename` owned by `owner`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub recipient: String,
    pub owner: String,
    pub filename: String,
}

/// SQLite-backed grant registry (`files` table, one row per grant).
#[derive(Clone)]
pub struct GrantRegistry {
    db: Database,
}

impl GrantRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record the uploader's own access to a freshly stored file.
    ///
    /// Returns `false` when the self-grant already existed (re-upload).
    pub fn grant_self(&self, owner: &str, filename: &str) -> Result<bool> {
        validate_filename(filename)?;
        let inserted = self.db.lock().execute(
            "INSERT INTO files (recipient, owner, filename) VALUES (?1, ?1, ?2)
             ON CONFLICT (recipient, owner, filename) DO NOTHING",
            rusqlite::params![owner, filename],
        )?;
        Ok(inserted > 0)
    }

    /// Every grant held by `recipient`, in insertion order.
    pub fn list_accessible(&self, recipient: &str) -> Result<Vec<Grant>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT recipient, owner, filename FROM files WHERE recipient = ?1 ORDER BY id",
        )?;
        let grants = stmt
            .query_map(rusqlite::params![recipient], |row| {
                Ok(Grant {
                    recipient: row.get(0)?,
                    owner: row.get(1)?,
                    filename: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    /// Pass the sender's access to `filename` on to `recipient`.
    ///
    /// The sender must already hold a grant for `filename`; the new grant
    /// names the same owner. If the sender holds several grants under that
    /// name, their own file wins, then the oldest grant. The recipient is
    /// only looked up once the sender's access is established, so a sender
    /// without access can't probe for usernames.
    pub fn share(&self, sender: &str, recipient: &str, filename: &str) -> Result<Grant> {
        if sender == recipient {
            return Err(ValidationError::SelfShare.into());
        }
        validate_filename(filename)?;

        let conn = self.db.lock();
        let owner = conn.query_row(
            "SELECT owner FROM files WHERE recipient = ?1 AND filename = ?2
             ORDER BY (owner = ?1) DESC, id ASC LIMIT 1",
            rusqlite::params![sender, filename],
            |row| row.get::<_, String>(0),
        );
        let owner = match owner {
            Ok(owner) => owner,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(AuthError::NoAccess.into()),
            Err(e) => return Err(e.into()),
        };

        let registered: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            rusqlite::params![recipient],
            |row| row.get(0),
        )?;
        if !registered {
            return Err(Error::NotFound(format!("user {recipient}")));
        }

        let inserted = conn.execute(
            "INSERT INTO files (recipient, owner, filename) VALUES (?1, ?2, ?3)",
            rusqlite::params![recipient, owner, filename],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::Conflict(format!(
                    "{recipient} already has access to {filename} from {owner}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(sender, recipient, owner, filename, "file shared");
        Ok(Grant {
            recipient: recipient.to_string(),
            owner,
            filename: filename.to_string(),
        })
    }

    /// Whether the exact `(recipient, owner, filename)` grant exists.
    pub fn check_access(&self, recipient: &str, owner: &str, filename: &str) -> Result<bool> {
        let found: bool = self.db.lock().query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE recipient = ?1 AND owner = ?2 AND filename = ?3)",
            rusqlite::params![recipient, owner, filename],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}
