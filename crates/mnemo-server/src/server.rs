//! Router assembly and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use mnemo_core::{GatewayError, MemoryGateway};
use mnemo_settings::GatewaySettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::error_envelope;
use crate::gateway::{HttpMemoryGateway, InMemoryGateway};
use crate::middleware::{authenticate, rate_limit};
use crate::routes::{auth, bridge, broadcast, health, memories};
use crate::state::AppState;
use crate::websocket::handlers as ws;

/// Pick the gateway implementation from settings.
///
/// No `base_url` means the built-in in-memory store (dev and tests).
pub fn gateway_from_settings(
    settings: &GatewaySettings,
) -> Result<Arc<dyn MemoryGateway>, GatewayError> {
    match &settings.base_url {
        Some(url) => {
            info!(base_url = %url, "using HTTP memory gateway");
            Ok(Arc::new(HttpMemoryGateway::new(
                url,
                std::time::Duration::from_secs(settings.timeout_secs),
            )?))
        }
        None => {
            info!("using in-memory gateway");
            Ok(Arc::new(InMemoryGateway::new()))
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse().map_or_else(
                |_| {
                    warn!(origin, "ignoring unparseable CORS origin");
                    None
                },
                Some,
            )
        })
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Assemble the full application router.
///
/// `/api/v1/*` is wrapped in bearer auth then HTTP rate limiting;
/// `/auth/refresh` is rate-limited by remote address only; `/health` and
/// the WebSocket endpoints sit outside both (the WS handlers run their own
/// admission). The error-envelope layer wraps everything.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/memories", post(memories::create).get(memories::search))
        .route(
            "/memories/{id}",
            put(memories::update).get(memories::get_one),
        )
        .route("/memories/{id}/history", get(memories::history))
        .route("/memories/{id}/relations", get(memories::relations))
        .route("/memories/{id}/suggestions", get(memories::suggestions))
        .route("/memories/{id}/compress", post(memories::compress))
        .route("/memories/{id}/stream", get(memories::stream))
        .route("/bridge", post(bridge::create))
        .route("/bridge/{session_id}", get(bridge::list_for_session))
        .route("/broadcast/{event_type}", post(broadcast::send))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ));

    Router::new()
        .nest("/api/v1", api)
        .route(
            "/auth/refresh",
            post(auth::refresh).layer(axum::middleware::from_fn_with_state(
                state.clone(),
                rate_limit,
            )),
        )
        .route("/health", get(health::health))
        .route("/ws/memory/{session_id}", get(ws::memory))
        .route("/ws/stream/{session_id}", get(ws::stream))
        .layer(axum::middleware::from_fn(error_envelope))
        .layer(cors_layer(&state.settings.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and start serving.
///
/// Returns the bound address (useful with port 0) and the join handle of
/// the server task. Cancelling `shutdown` drains in-flight requests and
/// stops the rate-limit sweeper.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let sweeper = state.rate_limiter.spawn_sweeper(shutdown.clone());
    let router = build_router(state);

    let handle = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;
        if let Err(e) = result {
            error!(error = %e, "server terminated abnormally");
        }
        if let Err(e) = sweeper.await {
            warn!(error = %e, "rate limit sweeper did not stop cleanly");
        }
    });

    info!(addr = %local_addr, "server listening");
    Ok((local_addr, handle))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
