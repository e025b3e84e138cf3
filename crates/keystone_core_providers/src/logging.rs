//! Subscriber installation for the engine's `tracing` events.
//!
//! Every binding site logs inside a `resource` span carrying its
//! `bound_name`, so enabling span events shows which site an event belongs to.
//!
//! ```
//! use keystone_core_providers::logging::{LoggingConfig, LoggingFormat};
//! use tracing::Level;
//!
//! let config = LoggingConfig::new()
//!     .with_level(Level::DEBUG)
//!     .with_format(LoggingFormat::Compact)
//!     .with_env_filter("keystone_engine=debug");
//! assert_eq!(config.level(), Level::DEBUG);
//! ```

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

// ─────────────────────────────────────────────────────────────────────────────
// LoggingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// LoggingError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to install the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The filter directives do not parse.
    #[error("invalid filter directives '{directives}': {message}")]
    Filter {
        /// The directives as configured.
        directives: String,
        /// Parser message.
        message: String,
    },

    /// A global subscriber is already installed.
    #[error(transparent)]
    AlreadyInstalled(#[from] TryInitError),
}

// ─────────────────────────────────────────────────────────────────────────────
// LoggingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    level: Level,
    format: LoggingFormat,
    /// Target directives, e.g. `keystone_engine=debug`.
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LoggingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a configuration logging at `INFO` in pretty format.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LoggingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets target directives, taking precedence over the level.
    #[must_use]
    pub fn with_env_filter(mut self, directives: impl Into<String>) -> Self {
        self.env_filter = Some(directives.into());
        self
    }

    /// Logs span enter and exit.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Configured level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Configured format.
    #[must_use]
    pub fn format(&self) -> LoggingFormat {
        self.format
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives).map_err(|error| LoggingError::Filter {
                directives: directives.clone(),
                message: error.to_string(),
            }),
            None => Ok(EnvFilter::new(self.level.as_str())),
        }
    }

    /// Installs the global subscriber.
    ///
    /// # Errors
    ///
    /// [`LoggingError::Filter`] for malformed directives and
    /// [`LoggingError::AlreadyInstalled`] if a subscriber was installed before.
    pub fn install(&self) -> Result<(), LoggingError> {
        let filter = self.filter()?;
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        let registry = tracing_subscriber::registry().with(filter);
        match self.format {
            LoggingFormat::Pretty => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_span_events(span_events))
                .try_init()?,
            LoggingFormat::Compact => registry
                .with(tracing_subscriber::fmt::layer().compact().with_span_events(span_events))
                .try_init()?,
            LoggingFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_span_events(span_events))
                .try_init()?,
        }

        tracing::info!(level = %self.level, format = ?self.format, "logging installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_info_pretty() {
        let config = LoggingConfig::default();
        assert_eq!(config.level(), Level::INFO);
        assert_eq!(config.format(), LoggingFormat::Pretty);
        assert!(!config.span_events);
    }

    #[test]
    fn malformed_directives_are_rejected() {
        let config = LoggingConfig::new().with_env_filter("keystone_engine=loud");
        let error = config.install().unwrap_err();
        assert!(matches!(error, LoggingError::Filter { .. }));
    }

    #[test]
    fn second_install_fails() {
        let config = LoggingConfig::new().with_format(LoggingFormat::Compact);
        let _ = config.install();
        let error = config.install().unwrap_err();
        assert!(matches!(error, LoggingError::AlreadyInstalled(_)));
    }
}
