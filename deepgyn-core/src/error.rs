//! Error types for the DeepGynScan core library.
//!
//! Uses `thiserror` for a single structured error enum covering the
//! prediction pipeline, the scan store, report rendering, identity and
//! configuration. The HTTP layer maps each variant to a status code and an
//! `{"error": ...}` body.

use std::path::PathBuf;

/// Top-level error type for the DeepGynScan core library.
#[derive(Debug, thiserror::Error)]
pub enum DeepGynError {
    #[error("Classifier output has {actual} values but the taxonomy defines {expected} labels")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Classifier produced an invalid output: {message}")]
    InvalidOutput { message: String },

    #[error("Classifier unavailable: {reason}")]
    ClassifierUnavailable { reason: String },

    #[error("Scan store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Report rendering failed: {message}")]
    ReportRender {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Authenticated identity may not access records of '{owner}'")]
    Forbidden { owner: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DeepGynError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn store(message: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            message: message.to_string(),
        }
    }

    pub fn render(message: impl std::fmt::Display) -> Self {
        Self::ReportRender {
            message: message.to_string(),
            source: None,
        }
    }

    /// A render failure that keeps the underlying error as its source.
    pub fn render_caused(
        message: impl std::fmt::Display,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ReportRender {
            message: message.to_string(),
            source: Some(source.into()),
        }
    }
}

impl From<rusqlite::Error> for DeepGynError {
    fn from(err: rusqlite::Error) -> Self {
        Self::store(err)
    }
}

impl From<genpdf::error::Error> for DeepGynError {
    fn from(err: genpdf::error::Error) -> Self {
        Self::render_caused("PDF layout failed", err)
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using `DeepGynError`.
pub type Result<T> = std::result::Result<T, DeepGynError>;
