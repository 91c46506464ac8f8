//! Lumo HMAC Library
//!
//! HMAC-SHA256 message authentication with replay resistance. Secrets stay
//! encrypted in memory, timestamped signatures carry a single-use nonce,
//! and nonces are tracked by a pluggable store (in-process, Redis, or a
//! generic key-value backend).

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod kv;
pub mod logging;
pub mod nonce;
pub mod secret;
pub mod transport;
