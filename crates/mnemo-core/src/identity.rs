//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

/// The authenticated caller, derived from validated token claims.
///
/// Never persisted; lives in request extensions for the duration of one
/// HTTP request or one WebSocket session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier embedded in the token.
    pub user_id: String,
    /// Whether the token carried an `is_admin` claim.
    pub is_admin: bool,
}

impl Identity {
    /// Create a non-admin identity.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_is_not_admin() {
        let id = Identity::user("u1");
        assert_eq!(id.user_id, "u1");
        assert!(!id.is_admin);
    }

    #[test]
    fn serializes_both_fields() {
        let id = Identity {
            user_id: "u2".into(),
            is_admin: true,
        };
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["user_id"], "u2");
        assert_eq!(json["is_admin"], true);
    }
}
