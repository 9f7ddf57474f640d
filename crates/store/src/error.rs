//! Error types for the blob store.

use thiserror::Error;

/// Errors from blob store operations.
///
/// `Corrupt` is a distinct failure class and is never folded into
/// `NotFound`: a blob whose on-disk bytes do not hash to its digest must be
/// reported as an integrity failure, not a missing file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob absent from the store.
    #[error("Blob {digest} is not present in the store")]
    NotFound { digest: String },

    /// Stored bytes do not hash to the digest.
    #[error("Blob {digest} failed verification (stored bytes hash to {actual})")]
    Corrupt { digest: String, actual: String },
}
