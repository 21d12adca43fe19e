//! Tracing subscriber setup shared by every binary embedding sanctum.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// Install a global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Returns an error if a
/// global subscriber was already installed.
pub fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?,
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()?,
    }

    Ok(())
}

/// Convenience wrapper that reads level and format from the `[logging]` section.
pub fn init_from_config(config: &crate::config::LoggingConfig) -> anyhow::Result<()> {
    init_logging(&config.level, config.format)
}
