//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber for binaries
//! - Pick the log level from `RUST_LOG`, falling back to settings
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - A second installation is reported as an error, never a panic

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::settings::{LogFormat, LoggingSettings};

pub use tracing_subscriber::util::TryInitError;

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install the global subscriber.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(settings));

    match settings.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}
