//! Tracing initialisation

use crate::settings::BootstrapSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid filter directive: {0}")]
    Directive(String),

    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Install a global subscriber
///
/// `RUST_LOG` takes precedence over `default_directive`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(default_directive: &str, json: bool) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| LoggingError::Directive(e.to_string()))?,
    };

    let (plain, structured) = if json {
        (None, Some(fmt::layer().with_target(true).json()))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(structured)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(())
}

/// Install a global subscriber using the log level and format of `settings`
pub fn init_from_settings(settings: &BootstrapSettings) -> Result<(), LoggingError> {
    init_tracing(&settings.log_level, settings.json_logs)
}
