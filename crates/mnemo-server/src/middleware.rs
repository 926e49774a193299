//! Request middleware: bearer authentication and rate-limit admission.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use mnemo_auth::AuthError;
use mnemo_core::Identity;

use crate::error::ApiError;
use crate::ratelimit::{Channel, RateLimiter};
use crate::state::AppState;

/// Authenticate the request from its `Authorization: Bearer` header.
///
/// On success the caller's [`Identity`] is inserted into request
/// extensions for handlers and the rate limiter downstream.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err(AuthError::MissingToken.into());
    };

    let identity = state.authenticator.authenticate_http(token)?;
    let _ = request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Admit or deny the request against the HTTP budget.
///
/// The charge identity is the authenticated user when [`authenticate`]
/// ran upstream, otherwise the remote address. Both outcomes carry
/// advisory `X-RateLimit-*` headers.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .extensions()
        .get::<Identity>()
        .map(|i| i.user_id.clone());
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client_id = RateLimiter::client_id(user_id.as_deref(), addr)?;

    if !state.rate_limiter.check(Channel::Http, &client_id) {
        let mut response = ApiError::RateLimited.into_response();
        response
            .headers_mut()
            .extend(state.rate_limiter.headers_for(&client_id));
        return Ok(response);
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .extend(state.rate_limiter.headers_for(&client_id));
    Ok(response)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use mnemo_settings::Settings;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state_with(http_limit: usize) -> AppState {
        let mut settings = Settings::default();
        settings.rate_limit.http_limit = http_limit;
        AppState::new(settings, Arc::new(InMemoryGateway::new())).unwrap()
    }

    fn protected_app(state: &AppState) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|identity: axum::Extension<Identity>| async move {
                    identity.0.user_id.clone()
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                rate_limit,
            ))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authenticate,
            ))
            .layer(axum::middleware::from_fn(crate::error::error_envelope))
    }

    fn request(token: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn valid_token_reaches_handler_with_identity() {
        let state = state_with(100);
        let token = state.authenticator.issue_access("u1", None).unwrap();
        let response = protected_app(&state)
            .oneshot(request(Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"u1");
    }

    #[tokio::test]
    async fn missing_token_is_401_with_envelope() {
        let state = state_with(100);
        let response = protected_app(&state).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"]["type"], "authentication_error");
        assert_eq!(parsed["error"]["path"], "/whoami");
    }

    #[tokio::test]
    async fn refresh_token_is_rejected_as_bearer() {
        let state = state_with(100);
        let token = state.authenticator.issue_refresh("u1", None).unwrap();
        let response = protected_app(&state)
            .oneshot(request(Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn over_budget_is_429_with_headers() {
        let state = state_with(2);
        let token = state.authenticator.issue_access("u1", None).unwrap();
        let app = protected_app(&state);

        for _ in 0..2 {
            let response = app.clone().oneshot(request(Some(&token))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"]["type"], "rate_limit_exceeded");
    }

    #[tokio::test]
    async fn success_carries_advisory_headers() {
        let state = state_with(10);
        let token = state.authenticator.issue_access("u1", None).unwrap();
        let response = protected_app(&state)
            .oneshot(request(Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");
    }

    #[tokio::test]
    async fn unidentifiable_client_is_400() {
        // Rate limit without auth upstream and without connect info.
        let state = state_with(10);
        let app = Router::new()
            .route("/open", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                rate_limit,
            ))
            .layer(axum::middleware::from_fn(crate::error::error_envelope));

        let response = app
            .oneshot(Request::builder().uri("/open").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
