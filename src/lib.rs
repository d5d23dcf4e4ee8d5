//! Short-lived, HMAC-signed QR tokens for attendance check-in.
//!
//! Tokens are multi-use: a verified token is never marked as consumed and
//! stays valid for every scan until it expires.

pub mod comms;
pub mod config;
pub mod security;
pub mod utils;

pub use config::{Config, ConfigError};
pub use security::{
    Rejection, SigningKey, TokenIssuer, TokenSettings, TokenVerifier, Verification,
};

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
