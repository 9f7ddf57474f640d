//! Error types for the package map model.

use thiserror::Error;

/// Errors that can occur while decoding, building, or persisting a package map.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors from parsing an integrity digest string.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Integrity digest '{0}' is missing the algorithm separator")]
    MissingSeparator(String),

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Integrity digest has invalid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),
}

/// Validation errors for lockfile entries.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Package name '{0}' is not a valid dependency path")]
    InvalidPackageName(String),

    #[error("Package '{name}' is missing an integrity digest")]
    MissingIntegrity { name: String },

    #[error("Package '{name}' file path '{path}' must be relative")]
    AbsoluteFilePath { name: String, path: String },

    #[error("Package '{name}' file path '{path}' escapes the package root")]
    EscapingFilePath { name: String, path: String },

    #[error("File '{path}' mode {mode:#o} has bits outside the permission mask")]
    InvalidMode { path: String, mode: u32 },
}
