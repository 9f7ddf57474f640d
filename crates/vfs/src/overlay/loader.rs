//! Module-loader probes.
//!
//! The host's module loader bypasses the public filesystem API with two
//! internal probes: a cheap stat ("file, directory, or absent?") and a
//! direct read used for `package.json`. Both are answered under the same
//! resolver contract as the public facade.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{run_blocking, Overlay, OverlayInner};
use crate::error::OverlayError;
use crate::resolver::Resolution;

/// Loader stat result for a regular file.
pub const MODULE_STAT_FILE: i64 = 0;
/// Loader stat result for a directory.
pub const MODULE_STAT_DIR: i64 = 1;
/// Loader stat result for an absent path.
pub const MODULE_STAT_ENOENT: i64 = -34;

impl Overlay {
    /// Loader stat probe.
    ///
    /// # Returns
    /// 0 for a file, 1 for a directory (including the virtual empty
    /// `node_modules` directories that keep recursive lookup terminating),
    /// -34 when absent.
    pub fn module_stat_sync(&self, path: &Path) -> i64 {
        self.inner.module_stat_core(path)
    }

    /// Async form of [`Overlay::module_stat_sync`].
    pub async fn module_stat(&self, path: impl Into<PathBuf>) -> i64 {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || Ok(inner.module_stat_core(&path)))
            .await
            .unwrap_or(MODULE_STAT_ENOENT)
    }

    /// Loader read probe, used for the direct `package.json` read.
    ///
    /// # Returns
    /// `Some(bytes)` when the path is a map-served file (a previously
    /// materialized real copy wins); `None` defers to the host loader.
    pub fn module_read_sync(&self, path: &Path) -> Result<Option<Vec<u8>>, OverlayError> {
        self.inner.module_read_core(path)
    }

    /// Async form of [`Overlay::module_read_sync`].
    pub async fn module_read(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<Option<Vec<u8>>, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.module_read_core(&path)).await
    }
}

impl OverlayInner {
    fn module_stat_core(&self, path: &Path) -> i64 {
        match self.resolve(path) {
            Resolution::File(_) => MODULE_STAT_FILE,
            Resolution::Dir(_) => MODULE_STAT_DIR,
            Resolution::Missing => MODULE_STAT_ENOENT,
            Resolution::Untracked => match std::fs::metadata(path) {
                Ok(metadata) if metadata.is_dir() => MODULE_STAT_DIR,
                Ok(_) => MODULE_STAT_FILE,
                Err(_) => MODULE_STAT_ENOENT,
            },
        }
    }

    fn module_read_core(&self, path: &Path) -> Result<Option<Vec<u8>>, OverlayError> {
        match self.resolve(path) {
            Resolution::File(entry) => {
                if path.exists() {
                    Ok(Some(std::fs::read(path)?))
                } else {
                    Ok(Some(self.store.read_all(&entry.integrity)?))
                }
            }
            _ => Ok(None),
        }
    }
}
