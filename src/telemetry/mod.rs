//! Tracing subscriber initialisation.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from `log.level`
//! in the settings, otherwise `info`. `log.json = true` switches the
//! output to one JSON object per line.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Telemetry-specific error type
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter \"{directive}\": {reason}")]
    Filter { directive: String, reason: String },
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Build the filter from the environment or the configured level
pub fn env_filter(config: &LogConfig) -> TelemetryResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = config.level.as_deref().unwrap_or("info");
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::Filter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global tracing subscriber. Fails if one is already installed.
pub fn init_telemetry(config: &LogConfig) -> TelemetryResult<()> {
    let filter = env_filter(config)?;

    let (plain, json) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(json = config.json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }

        let config = LogConfig {
            level: Some("event_mailer=loud".to_string()),
            json: false,
        };

        assert!(matches!(env_filter(&config), Err(TelemetryError::Filter { .. })));
    }

    #[test]
    fn test_configured_level_used() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }

        let config = LogConfig {
            level: Some("debug".to_string()),
            json: true,
        };

        let filter = env_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }
}
