//! # mnemo-auth
//!
//! Bearer-token authentication for the mnemo service.
//!
//! Tokens are JWTs signed with a shared secret. Access and refresh tokens
//! are structurally identical except for their `type` claim and expiry
//! duration; presenting one where the other is expected fails with
//! [`AuthError::WrongType`]. There is no revocation list — tokens die only
//! by expiry.
//!
//! The [`TokenAuthenticator`] is configured once at startup (secret,
//! algorithm, TTLs) and is read-only thereafter, so it can be shared freely
//! across request handlers.

pub mod authenticator;
pub mod errors;

pub use authenticator::{Claims, TokenAuthenticator, TokenPair, TokenType};
pub use errors::AuthError;
