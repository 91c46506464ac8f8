//! Tracing subscriber setup for applications embedding the authenticator.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::HmacError;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` overrides the configured level. Fails if a global subscriber
/// has already been set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), HmacError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| HmacError::Config {
            message: format!("Invalid log filter '{}': {}", config.level, e),
        })?;

    let result = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init(),
        _ => {
            // Default to pretty format
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()
        }
    };

    result.map_err(|e| HmacError::Config {
        message: format!("Failed to initialize logging: {}", e),
    })
}
