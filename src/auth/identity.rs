use crate::error::AuthError;
use serde::Serialize;

/// Who is making a request.
///
/// Produced by the access gate for every request and by
/// [`CredentialStore::verify`](super::CredentialStore::verify). Handlers that
/// need a user call [`Identity::require`] instead of matching on a raw
/// username, so an anonymous caller can never pass as an empty name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "username", rename_all = "lowercase")]
pub enum Identity {
    Anonymous,
    Identified(String),
}

impl Identity {
    pub fn identified(username: impl Into<String>) -> Self {
        Self::Identified(username.into())
    }

    /// The username, or `AuthenticationRequired` for anonymous callers.
    pub fn require(&self) -> Result<&str, AuthError> {
        match self {
            Self::Identified(username) => Ok(username),
            Self::Anonymous => Err(AuthError::AuthenticationRequired),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Identified(username) => Some(username),
            Self::Anonymous => None,
        }
    }
}

impl From<Option<String>> for Identity {
    fn from(username: Option<String>) -> Self {
        username.map_or(Self::Anonymous, Self::Identified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_requires_authentication() {
        assert_eq!(
            Identity::Anonymous.require(),
            Err(AuthError::AuthenticationRequired)
        );
        assert_eq!(Identity::Anonymous.username(), None);
    }

    #[test]
    fn identified_yields_username() {
        let id = Identity::identified("alice");
        assert_eq!(id.require(), Ok("alice"));
        assert_eq!(id.username(), Some("alice"));
    }

    #[test]
    fn from_resolved_option() {
        assert_eq!(Identity::from(None), Identity::Anonymous);
        assert_eq!(
            Identity::from(Some("bob".to_string())),
            Identity::identified("bob")
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Identity::identified("alice")).unwrap();
        assert_eq!(json["kind"], "identified");
        assert_eq!(json["username"], "alice");
        let json = serde_json::to_value(Identity::Anonymous).unwrap();
        assert_eq!(json["kind"], "anonymous");
    }
}
