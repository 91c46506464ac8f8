//! Error types for lumo-hmac.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
