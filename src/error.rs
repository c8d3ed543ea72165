// src/error.rs

//! Unified error handling for the sitemap generator.

use std::fmt;

use thiserror::Error;

/// Result type alias for generator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog API answered with a non-success status
    #[error("Catalog API returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Sitemap XML could not be parsed
    #[error("XML error in {key}: {message}")]
    Xml { key: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catalog read failed for a scope
    #[error("Source error for {context}: {message}")]
    Source { context: String, message: String },

    /// Output tree could not be written
    #[error("Sink error for {key}: {message}")]
    Sink { key: String, message: String },

    /// Run finished but some scopes were skipped and strict mode is on
    #[error("{failed} scope(s) failed; strict mode treats partial output as an error")]
    PartialFailure { failed: usize },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a source error with context.
    pub fn source(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Source {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a sink error for an output key.
    pub fn sink(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Sink {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create an XML error for an output key.
    pub fn xml(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Xml {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    return true;
                }
                e.status()
                    .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_server_errors_are_transient() {
        let err = AppError::Upstream {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());

        let err = AppError::Upstream {
            status: 429,
            message: "slow down".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = AppError::Upstream {
            status: 400,
            message: "bad filter".into(),
        };
        assert!(!err.is_transient());
        assert!(!AppError::config("missing").is_transient());
        assert!(!AppError::sink("sitemap.xml", "disk full").is_transient());
    }

    #[test]
    fn display_includes_context() {
        let err = AppError::source("Amatom/Standoffs", "boom");
        assert_eq!(err.to_string(), "Source error for Amatom/Standoffs: boom");
    }
}
