//! Configuration module.
//!
//! Handles loading and validating authenticator configuration from TOML files.

mod settings;

pub use settings::*;
