//! Error types for schema composition and alert encoding

use thiserror::Error;

/// Result type for alert codec operations
pub type Result<T> = std::result::Result<T, AlertError>;

/// Alert codec errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Cannot load schema fragment {origin}: {reason}")]
    SchemaLoad { origin: String, reason: String },

    #[error("Schema resolution failed in {origin}: {reason}")]
    SchemaResolution { origin: String, reason: String },

    #[error("Encoding error at {path}: {reason}")]
    Encoding { path: String, reason: String },

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AlertError {
    pub(crate) fn resolution(origin: &str, reason: impl Into<String>) -> Self {
        Self::SchemaResolution {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn encoding(path: &str, reason: impl Into<String>) -> Self {
        Self::Encoding {
            path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }

    pub(crate) fn decoding(reason: impl Into<String>) -> Self {
        Self::Decoding(reason.into())
    }
}
