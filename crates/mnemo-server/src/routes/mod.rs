//! HTTP route handlers.

pub mod auth;
pub mod bridge;
pub mod broadcast;
pub mod health;
pub mod memories;
