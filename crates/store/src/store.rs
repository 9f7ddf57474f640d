//! Content-addressed blob store.
//!
//! Blobs are stored once per digest under a sharded layout:
//!
//! ```text
//! <root>/content-v2/<algorithm>/<hex[0..2]>/<hex[2..4]>/<hex[4..]>
//! ```
//!
//! The digest-to-path function is pure, so readers can redirect read-only
//! opens straight into the cache without copying. Writers publish with
//! write-to-temp, fsync, rename; concurrent writers of the same digest race
//! benignly because their bytes are identical by construction.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use pkgmap_model::{HashAlgorithm, Integrity};

use crate::error::StoreError;

const CONTENT_DIR: &str = "content-v2";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content-addressed blob store rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    algorithm: HashAlgorithm,
}

impl BlobStore {
    /// Create a store over `root` using the default algorithm (SHA-512).
    ///
    /// Directories are created lazily on the first `put`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            algorithm: HashAlgorithm::Sha512,
        }
    }

    /// Override the algorithm used by `put`.
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Get the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the on-disk path for a digest.
    ///
    /// Pure function of the digest and the configured root; does not touch
    /// disk.
    pub fn path_for(&self, digest: &Integrity) -> PathBuf {
        let hex: String = digest.hex();
        self.root
            .join(CONTENT_DIR)
            .join(digest.algorithm().as_str())
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex[4..])
    }

    /// Check whether a blob is present.
    pub fn contains(&self, digest: &Integrity) -> bool {
        self.path_for(digest).exists()
    }

    /// Store `data`, returning its digest.
    ///
    /// Idempotent: an existing blob with the expected size is not rewritten.
    pub fn put(&self, data: &[u8]) -> Result<Integrity, StoreError> {
        self.put_with(self.algorithm, data)
    }

    /// Store `data` hashed with a specific algorithm.
    pub fn put_with(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Integrity, StoreError> {
        let digest: Integrity = Integrity::from_bytes(algorithm, data);
        let path: PathBuf = self.path_for(&digest);

        if let Ok(metadata) = std::fs::metadata(&path) {
            if metadata.len() == data.len() as u64 {
                debug!(digest = %digest, "blob hit");
                return Ok(digest);
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let parent: &Path = path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path: PathBuf = parent.join(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        {
            use std::io::Write as _;
            let mut file: std::fs::File = std::fs::File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &path)?;

        debug!(digest = %digest, size = data.len(), "blob stored");
        Ok(digest)
    }

    /// Read a blob in full, verifying its digest.
    ///
    /// # Errors
    /// `NotFound` when the blob is absent; `Corrupt` when the stored bytes do
    /// not hash to `digest`.
    pub fn read_all(&self, digest: &Integrity) -> Result<Vec<u8>, StoreError> {
        let path: PathBuf = self.path_for(digest);
        let data: Vec<u8> = std::fs::read(&path).map_err(|e| self.map_missing(e, digest))?;

        if !digest.matches(&data) {
            let actual: Integrity = Integrity::from_bytes(digest.algorithm(), &data);
            warn!(digest = %digest, actual = %actual, "blob failed verification");
            return Err(StoreError::Corrupt {
                digest: digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(data)
    }

    /// Open a blob for streamed reading.
    ///
    /// Verification is skipped on the streamed path; use `read_all` when the
    /// caller needs the integrity guarantee.
    pub fn open_read(&self, digest: &Integrity) -> Result<std::fs::File, StoreError> {
        let path: PathBuf = self.path_for(digest);
        std::fs::File::open(&path).map_err(|e| self.map_missing(e, digest))
    }

    fn map_missing(&self, error: std::io::Error, digest: &Integrity) -> StoreError {
        if error.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                digest: digest.to_string(),
            }
        } else {
            StoreError::Io(error)
        }
    }
}
