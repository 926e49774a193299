//! WebSocket subsystem: connection registry, chunk streaming, relay
//! protocol, admin dispatch, and the endpoint handlers.

pub mod dispatcher;
pub mod handlers;
pub mod registry;
pub mod streaming;
