//! API error taxonomy and the HTTP error envelope.
//!
//! Every error response carries the same body shape:
//! `{"error": {type, message, status, timestamp, path, method}}`.
//! Handlers only know their own failure; the request path and method are
//! stamped by [`error_envelope`], which wraps the whole router and rewrites
//! any response tagged with [`ErrorDetails`].

use axum::Json;
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use mnemo_auth::AuthError;
use mnemo_core::{GatewayError, now_rfc3339};
use serde_json::{Value, json};
use tracing::warn;

use crate::ratelimit::RateLimitError;

/// Failure of one API operation, mapped to a status and envelope type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Token missing, expired, malformed, or of the wrong type.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The caller exhausted its request budget.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Authenticated but not allowed to perform this operation.
    #[error("{0}")]
    Forbidden(String),

    /// The addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request itself is unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The memory gateway failed; surfaced without retry.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::IdentifierMissing => Self::BadRequest(err.to_string()),
        }
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable `type` field for the envelope.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Auth(_) => "authentication_error",
            Self::RateLimited => "rate_limit_exceeded",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Gateway(_) => "gateway_error",
        }
    }
}

/// Envelope fields attached to an error response for the stamping
/// middleware to pick up.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    /// Machine-readable error type.
    pub error_type: &'static str,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code.
    pub status: u16,
}

/// Build the error envelope body.
#[must_use]
pub fn envelope_body(details: &ErrorDetails, path: &str, method: &str) -> Value {
    json!({
        "error": {
            "type": details.error_type,
            "message": details.message,
            "status": details.status,
            "timestamp": now_rfc3339(),
            "path": path,
            "method": method,
        }
    })
}

/// The WebSocket-side error envelope, sent best-effort before teardown.
#[must_use]
pub fn ws_error_envelope(error_type: &str, message: &str, status: u16) -> Value {
    json!({
        "type": "error",
        "data": {
            "type": error_type,
            "message": message,
            "status": status,
            "timestamp": now_rfc3339(),
        }
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Gateway(ref e) = self {
            warn!(error = %e, "memory gateway failure");
        }
        let details = ErrorDetails {
            error_type: self.error_type(),
            message: self.to_string(),
            status: self.status().as_u16(),
        };
        // Path and method are unknown here; the envelope middleware
        // rewrites the body with them when the response passes through.
        let mut response =
            (self.status(), Json(envelope_body(&details, "", ""))).into_response();
        let _ = response.extensions_mut().insert(details);
        response
    }
}

/// Router-wide middleware that stamps error envelopes with the request
/// path and method.
pub async fn error_envelope(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().to_string();

    let response = next.run(request).await;
    let Some(details) = response.extensions().get::<ErrorDetails>().cloned() else {
        return response;
    };

    let status = response.status();
    let mut stamped = (status, Json(envelope_body(&details, &path, &method))).into_response();
    for (name, value) in response.headers() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
            continue;
        }
        let _ = stamped.headers_mut().insert(name.clone(), value.clone());
    }
    stamped
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
