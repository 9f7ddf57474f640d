//! Error types for the overlay.
//!
//! The overlay is the failure boundary: internal resolver outcomes are
//! converted to POSIX-style codes before they leave it, integrity failures
//! surface as a distinct class, and host errors other than NotFound are
//! propagated verbatim.

use std::path::PathBuf;

use thiserror::Error;

use pkgmap_model::ModelError;
use pkgmap_store::StoreError;

/// Errors surfaced by overlay operations.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Missing path inside the dependency domain (ENOENT).
    #[error("ENOENT: no such file or directory, {op} '{path}'")]
    NotFound { op: &'static str, path: PathBuf },

    /// File operation on a directory entry (EISDIR).
    #[error("EISDIR: illegal operation on a directory, {op} '{path}'")]
    IsDirectory { op: &'static str, path: PathBuf },

    /// Directory operation on a file entry (ENOTDIR).
    #[error("ENOTDIR: not a directory, {op} '{path}'")]
    NotDirectory { op: &'static str, path: PathBuf },

    /// Access mode rejected for a map-served entry (EACCES).
    #[error("EACCES: permission denied, {op} '{path}'")]
    AccessDenied { op: &'static str, path: PathBuf },

    /// Blob store failure; integrity errors pass through undisguised.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Package map failure (decode, validation, persistence).
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Host filesystem error propagated verbatim.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OverlayError {
    /// POSIX-style code for errors that map to one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            OverlayError::NotFound { .. } => Some("ENOENT"),
            OverlayError::IsDirectory { .. } => Some("EISDIR"),
            OverlayError::NotDirectory { .. } => Some("ENOTDIR"),
            OverlayError::AccessDenied { .. } => Some("EACCES"),
            OverlayError::Store(StoreError::NotFound { .. }) => Some("ENOENT"),
            OverlayError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => Some("ENOENT"),
            _ => None,
        }
    }

    /// Numeric errno for errors that map to one.
    pub fn errno(&self) -> Option<i32> {
        match self.code() {
            Some("ENOENT") => Some(-2),
            Some("EACCES") => Some(-13),
            Some("ENOTDIR") => Some(-20),
            Some("EISDIR") => Some(-21),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn err(op: &'static str) -> OverlayError {
        OverlayError::NotFound {
            op,
            path: Path::new("/p").to_path_buf(),
        }
    }

    #[test]
    fn test_codes_and_errnos() {
        assert_eq!(err("stat").code(), Some("ENOENT"));
        assert_eq!(err("stat").errno(), Some(-2));

        let isdir: OverlayError = OverlayError::IsDirectory {
            op: "read",
            path: PathBuf::from("/d"),
        };
        assert_eq!(isdir.code(), Some("EISDIR"));
        assert_eq!(isdir.errno(), Some(-21));

        let notdir: OverlayError = OverlayError::NotDirectory {
            op: "scandir",
            path: PathBuf::from("/f"),
        };
        assert_eq!(notdir.code(), Some("ENOTDIR"));
        assert_eq!(notdir.errno(), Some(-20));

        let denied: OverlayError = OverlayError::AccessDenied {
            op: "access",
            path: PathBuf::from("/d"),
        };
        assert_eq!(denied.code(), Some("EACCES"));
        assert_eq!(denied.errno(), Some(-13));
    }

    #[test]
    fn test_missing_blob_presents_as_enoent() {
        let error: OverlayError = OverlayError::Store(StoreError::NotFound {
            digest: "sha512-AAAA".to_string(),
        });
        assert_eq!(error.code(), Some("ENOENT"));
    }

    #[test]
    fn test_corrupt_blob_has_no_posix_code() {
        let error: OverlayError = OverlayError::Store(StoreError::Corrupt {
            digest: "sha512-AAAA".to_string(),
            actual: "sha512-BBBB".to_string(),
        });
        assert_eq!(error.code(), None);
        assert_eq!(error.errno(), None);
    }

    #[test]
    fn test_real_enoent_keeps_its_code() {
        let io: std::io::Error = std::io::Error::from(std::io::ErrorKind::NotFound);
        let error: OverlayError = OverlayError::Io(io);
        assert_eq!(error.code(), Some("ENOENT"));
        assert_eq!(error.errno(), Some(-2));
    }
}
