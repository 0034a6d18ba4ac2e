//! # Observability Configuration
//!
//! Environment-specific logging configuration.

use std::env;

use crate::errors::{AppError, AppResult};

/// Log levels accepted in `LOG_LEVEL`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// Level for the `meter_scan` target
    pub log_level: String,
    /// Explicit format; `None` picks one from the environment
    pub log_format: Option<LogFormat>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: None,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from `ENVIRONMENT`, `LOG_LEVEL` and `LOG_FORMAT`
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(environment) = env::var("ENVIRONMENT") {
            config.environment = environment.trim().to_ascii_lowercase();
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level.trim().to_ascii_lowercase();
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            config.log_format = Some(LogFormat::parse(&format).ok_or_else(|| {
                AppError::Config(format!("LOG_FORMAT '{}' must be 'pretty' or 'json'", format))
            })?);
        }

        Ok(config)
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Pretty output in development unless overridden, JSON everywhere else
    pub fn effective_log_format(&self) -> LogFormat {
        match self.log_format {
            Some(format) => format,
            None if self.is_development() => LogFormat::Pretty,
            None => LogFormat::Json,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.environment.trim().is_empty() {
            return Err(AppError::Config("environment cannot be empty".to_string()));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "Invalid log level '{}', expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
