//! Token issuance, decoding, and identity extraction.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use mnemo_core::Identity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::AuthError;

/// Recognized token `type` claim values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Short-lived token presented on every request.
    Access,
    /// Long-lived token exchanged for a fresh pair.
    Refresh,
}

impl TokenType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Decoded token payload.
///
/// `extra` holds every claim other than `user_id`/`exp`/`type`, carried
/// forward verbatim across refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token subject.
    pub user_id: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// `access` or `refresh`; anything else is rejected at decode time.
    #[serde(rename = "type")]
    pub token_type: String,
    /// Pass-through claims (e.g. `is_admin`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Identity carried by these claims. `is_admin` defaults to false.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            is_admin: self
                .extra
                .get("is_admin")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// A freshly rotated access + refresh pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// New access token.
    pub access_token: String,
    /// New refresh token.
    pub refresh_token: String,
}

/// Issues and validates bearer tokens for both HTTP and WebSocket entry.
///
/// Holds no mutable state; the secret and algorithm are fixed per
/// deployment.
pub struct TokenAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenAuthenticator {
    /// Create an authenticator over a shared secret.
    ///
    /// Negative TTLs are permitted (tests use them to mint already-expired
    /// tokens).
    #[must_use]
    pub fn new(
        secret: &str,
        algorithm: Algorithm,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Issue an access token for `user_id`, embedding `extra` claims.
    pub fn issue_access(
        &self,
        user_id: &str,
        extra: Option<&Map<String, Value>>,
    ) -> Result<String, AuthError> {
        self.issue(user_id, TokenType::Access, self.access_ttl, extra)
    }

    /// Issue a refresh token for `user_id`, embedding `extra` claims.
    pub fn issue_refresh(
        &self,
        user_id: &str,
        extra: Option<&Map<String, Value>>,
    ) -> Result<String, AuthError> {
        self.issue(user_id, TokenType::Refresh, self.refresh_ttl, extra)
    }

    fn issue(
        &self,
        user_id: &str,
        token_type: TokenType,
        ttl: Duration,
        extra: Option<&Map<String, Value>>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
            token_type: token_type.as_str().to_string(),
            extra: extra.cloned().unwrap_or_default(),
        };
        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(AuthError::Signing)
    }

    /// Decode and validate a token.
    ///
    /// Fails with [`AuthError::Expired`] past the embedded expiry (zero
    /// leeway), [`AuthError::Invalid`] on bad signature or malformed
    /// payload, and [`AuthError::WrongType`] when the `type` claim is
    /// neither `access` nor `refresh`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            })?;

        let claims = data.claims;
        if claims.token_type != TokenType::Access.as_str()
            && claims.token_type != TokenType::Refresh.as_str()
        {
            return Err(AuthError::WrongType);
        }
        Ok(claims)
    }

    /// Authenticate an HTTP request from its bearer credentials.
    ///
    /// Requires an access-type token; a refresh token presented here fails
    /// with [`AuthError::WrongType`].
    pub fn authenticate_http(&self, bearer: &str) -> Result<Identity, AuthError> {
        let claims = self.decode(bearer)?;
        if claims.token_type != TokenType::Access.as_str() {
            return Err(AuthError::WrongType);
        }
        Ok(claims.identity())
    }

    /// Authenticate a WebSocket connection from its `token` query parameter.
    ///
    /// Absence of a token is itself an authentication failure.
    pub fn authenticate_websocket(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        self.authenticate_http(token)
    }

    /// Exchange a refresh token for a fresh access + refresh pair.
    ///
    /// All extra claims are carried forward; `user_id`/`exp`/`type` are
    /// re-derived.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh.as_str() {
            return Err(AuthError::WrongType);
        }

        debug!(user_id = %claims.user_id, "rotating token pair");
        let extra = Some(&claims.extra);
        Ok(TokenPair {
            access_token: self.issue_access(&claims.user_id, extra)?,
            refresh_token: self.issue_refresh(&claims.user_id, extra)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
