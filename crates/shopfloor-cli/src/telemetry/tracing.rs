//! Tracing initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber.
///
/// The level comes from `RUST_LOG`, for example
/// `RUST_LOG=info,shopfloor_postgres::queries=debug`, and defaults to `info`.
///
/// # Errors
///
/// Returns an error if `RUST_LOG` does not parse or a subscriber is
/// already installed.
pub(crate) fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = create_env_filter()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

fn create_env_filter() -> anyhow::Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::try_new(directives)
            .map_err(|e| anyhow::anyhow!("Invalid {}: {e}", EnvFilter::DEFAULT_ENV)),
        Err(_) => Ok(EnvFilter::new("info")),
    }
}
