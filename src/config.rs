//! Admission configuration.
//!
//! # Responsibilities
//! - Define the request/connection limit schema (serde handles syntax)
//! - Semantic validation: limits positive, connection cap ≥ request cap
//! - Load from TOML files
//!
//! # Design Decisions
//! - Configuration errors are fatal at construction, before any socket opens
//! - The connection cap must cover the request cap: a connection is cheaper
//!   to hold than a request is to process, and idle headroom is useful

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of concurrently processed requests.
pub const DEFAULT_REQUEST_LIMIT: usize = 1024;

/// Default number of concurrently open connections. Double the request
/// limit, on the assumption that processing a request costs more memory
/// than a raw connection and some idle connections are worth keeping.
pub const DEFAULT_CONNECTION_LIMIT: usize = 2 * DEFAULT_REQUEST_LIMIT;

/// Concurrency limits for a single server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum number of requests processed concurrently.
    pub request_limit: usize,

    /// Maximum number of open connections. Must be at least
    /// `request_limit`.
    pub connection_limit: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            request_limit: DEFAULT_REQUEST_LIMIT,
            connection_limit: DEFAULT_CONNECTION_LIMIT,
        }
    }
}

impl AdmissionConfig {
    /// Build a validated config.
    pub fn new(request_limit: usize, connection_limit: usize) -> Result<Self, ConfigError> {
        let config = Self {
            request_limit,
            connection_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks, run after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_limit == 0 {
            return Err(ConfigError::ZeroRequestLimit);
        }
        if self.connection_limit < self.request_limit {
            return Err(ConfigError::ConnectionLimitTooSmall {
                connection_limit: self.connection_limit,
                request_limit: self.request_limit,
            });
        }
        Ok(())
    }

    /// Load and validate configuration from a TOML file.
    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }
}

/// Why a configuration was refused.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("request limit must be > 0")]
    ZeroRequestLimit,

    #[error("connection limit {connection_limit} must be >= request limit {request_limit}")]
    ConnectionLimitTooSmall {
        connection_limit: usize,
        request_limit: usize,
    },

    #[error("failed to read config: {0}")]
    Io(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AdmissionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.connection_limit, 2 * config.request_limit);
    }

    #[test]
    fn zero_request_limit_is_rejected() {
        let err = AdmissionConfig::new(0, 10).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRequestLimit));
    }

    #[test]
    fn connection_limit_below_request_limit_is_rejected() {
        let err = AdmissionConfig::new(10, 5).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ConnectionLimitTooSmall {
                connection_limit: 5,
                request_limit: 10,
            }
        ));
    }

    #[test]
    fn parses_toml() {
        let config = AdmissionConfig::from_toml_str(
            "request_limit = 16\nconnection_limit = 32\n",
        )
        .unwrap();
        assert_eq!(config.request_limit, 16);
        assert_eq!(config.connection_limit, 32);
    }

    #[test]
    fn toml_defaults_fill_missing_fields() {
        let config = AdmissionConfig::from_toml_str("").unwrap();
        assert_eq!(config.request_limit, DEFAULT_REQUEST_LIMIT);
    }

    #[test]
    fn invalid_toml_values_fail_validation() {
        let err =
            AdmissionConfig::from_toml_str("request_limit = 8\nconnection_limit = 4\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::ConnectionLimitTooSmall { .. }));
    }
}
