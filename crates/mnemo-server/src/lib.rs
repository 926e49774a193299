//! # mnemo-server
//!
//! The mnemo coordination layer: axum HTTP routes and WebSocket endpoints
//! over shared subsystems.
//!
//! - [`ratelimit`]: sliding-window admission per client identity
//! - [`websocket`]: connection registry, chunk streaming, relay protocol,
//!   admin dispatch
//! - [`gateway`]: in-memory and HTTP implementations of the memory store
//!   collaborator
//! - [`middleware`] / [`error`]: bearer auth, rate limiting, and the
//!   uniform error envelope
//!
//! [`server::serve`] binds a listener and runs until its cancellation
//! token fires; the binary crate owns settings loading, tracing, and
//! signal handling.

pub mod error;
pub mod gateway;
pub mod middleware;
pub mod ratelimit;
pub mod routes;
pub mod server;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use server::{build_router, gateway_from_settings, serve};
pub use state::AppState;
