//! Error types for sentence parsing

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The leading tag is not a registered sentence kind
    #[error("Unrecognized RMONITOR sentence type {0}")]
    UnknownKind(String),

    /// Known kind, but too few fields or a field of the wrong type
    #[error("Malformed {kind} sentence: {reason}")]
    MalformedFields { kind: String, reason: String },

    /// Record with no fields at all
    #[error("Empty record")]
    EmptyRecord,

    /// Unquoted line break inside what should be one sentence
    #[error("Line break inside an unquoted field")]
    SplitRecord,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown charset: {0}")]
    UnknownCharset(String),
}

impl ProtocolError {
    pub fn malformed<K: Into<String>, S: Into<String>>(kind: K, reason: S) -> Self {
        Self::MalformedFields {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// True for the errors non-strict parsing absorbs into a generic report
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownKind(_) | Self::MalformedFields { .. })
    }
}
