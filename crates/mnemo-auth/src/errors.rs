//! Auth error types.

/// Errors that can occur while issuing or validating tokens.
///
/// Every variant surfaces to HTTP callers as 401 and to WebSocket callers
/// as connection refusal before accept.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token's embedded expiry is in the past.
    #[error("token has expired")]
    Expired,

    /// Signature verification failed or the payload is malformed.
    #[error("invalid token")]
    Invalid,

    /// The token's `type` claim did not match what the operation expects.
    #[error("invalid token type")]
    WrongType,

    /// No token was supplied where one is required.
    #[error("token not found")]
    MissingToken,

    /// Token signing failed (misconfigured secret/algorithm).
    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_display() {
        assert_eq!(AuthError::Expired.to_string(), "token has expired");
    }

    #[test]
    fn wrong_type_display() {
        assert_eq!(AuthError::WrongType.to_string(), "invalid token type");
    }

    #[test]
    fn missing_token_display() {
        assert_eq!(AuthError::MissingToken.to_string(), "token not found");
    }
}
