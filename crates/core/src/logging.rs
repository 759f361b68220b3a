//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. A filter that fails to
/// parse falls back to `info`.
///
/// # Example
/// ```no_run
/// orbit_core::init_logging(&orbit_core::config::LoggingConfig::default());
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A subscriber may already be installed (tests, embedding).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(config.thread_ids),
        )
        .try_init();
}
