//! Observability utilities for the trigger runtime.

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Errors produced while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter {
        /// Directive as supplied.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    default_filter: String,
    with_target: bool,
}

impl TelemetryConfig {
    /// Creates settings with `default_filter` used when `RUST_LOG` is unset.
    #[must_use]
    pub fn new(default_filter: impl Into<String>) -> Self {
        Self {
            default_filter: default_filter.into(),
            with_target: false,
        }
    }

    /// Includes the event target (module path) in formatted output.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Builds the effective filter: `RUST_LOG` when set, else the default.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] when the default directive
    /// cannot be parsed.
    pub fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        EnvFilter::try_new(&self.default_filter).map_err(|err| TelemetryError::InvalidFilter {
            directive: self.default_filter.clone(),
            reason: err.to_string(),
        })
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

/// Installs a global `fmt` subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a bad directive and
/// [`TelemetryError::AlreadyInstalled`] when a global subscriber exists.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.filter()?;
    let directive = filter.to_string();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))?;

    debug!(filter = %directive, "tracing subscriber installed");
    Ok(())
}
