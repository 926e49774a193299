//! Shared application state handed to every handler.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::Algorithm;
use mnemo_auth::TokenAuthenticator;
use mnemo_core::MemoryGateway;
use mnemo_settings::{Settings, SettingsError};

use crate::ratelimit::RateLimiter;
use crate::websocket::dispatcher::EventDispatcher;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::streaming::StreamingCoordinator;

/// Everything a handler can reach, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Token issuance and validation.
    pub authenticator: Arc<TokenAuthenticator>,
    /// Sliding-window admission control.
    pub rate_limiter: Arc<RateLimiter>,
    /// Live WebSocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Chunk streaming and relay sessions.
    pub streaming: Arc<StreamingCoordinator>,
    /// Admin broadcast fan-out.
    pub dispatcher: Arc<EventDispatcher>,
    /// Memory persistence collaborator.
    pub gateway: Arc<dyn MemoryGateway>,
    /// Loaded configuration, immutable for the process lifetime.
    pub settings: Arc<Settings>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire up all subsystems from loaded settings and a gateway.
    ///
    /// Fails only on an unparseable `auth.jwt_algorithm`.
    pub fn new(settings: Settings, gateway: Arc<dyn MemoryGateway>) -> Result<Self, SettingsError> {
        let algorithm = Algorithm::from_str(&settings.auth.jwt_algorithm).map_err(|_| {
            SettingsError::InvalidValue(format!(
                "unsupported JWT algorithm: {}",
                settings.auth.jwt_algorithm
            ))
        })?;
        let authenticator = Arc::new(TokenAuthenticator::new(
            &settings.auth.jwt_secret,
            algorithm,
            Duration::minutes(settings.auth.access_token_expire_minutes),
            Duration::days(settings.auth.refresh_token_expire_days),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(&settings.rate_limit));
        let registry = Arc::new(ConnectionRegistry::new());
        let streaming = Arc::new(StreamingCoordinator::new(
            Arc::clone(&registry),
            &settings.streaming,
        ));
        let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&registry)));

        Ok(Self {
            authenticator,
            rate_limiter,
            registry,
            streaming,
            dispatcher,
            gateway,
            settings: Arc::new(settings),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
