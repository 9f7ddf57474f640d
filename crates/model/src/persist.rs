//! Package map persistence and the lockfile seal.
//!
//! The persisted map lives at `<project>/node_modules/.pkglock-hash` and
//! carries the map tree plus a seal: the integrity digest of the lockfile
//! bytes it was built from. The seal is authoritative; a co-located map that
//! fails seal verification is discarded and rebuilt.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;
use crate::integrity::{HashAlgorithm, Integrity};
use crate::map::{PackageMap, DEP_DIR};

/// File name of the persisted map under the dependency directory.
pub const MAP_FILE_NAME: &str = ".pkglock-hash";

/// The on-disk form of the package map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMap {
    /// Seal: digest of the lockfile bytes the map was built from.
    pub lockfile_integrity: Integrity,
    /// Build time in microseconds since the Unix epoch; the synthetic mtime
    /// served for every map entry.
    pub built_at: i64,
    /// The map tree.
    pub map: PackageMap,
}

/// Path of the persisted map file for a project.
pub fn map_file_path(project_root: &Path) -> PathBuf {
    project_root.join(DEP_DIR).join(MAP_FILE_NAME)
}

/// Write the map and its seal for `project_root`.
///
/// The file is published with a write-to-temp-then-rename so concurrent
/// readers see either the previous or the next version, never a partial one.
///
/// # Arguments
/// * `map` - The built package map
/// * `project_root` - Project prefix the dependency directory lives under
/// * `lockfile_bytes` - Exact bytes of the lockfile the map was built from
pub fn persist(
    map: &PackageMap,
    project_root: &Path,
    lockfile_bytes: &[u8],
) -> Result<PersistedMap, ModelError> {
    let persisted: PersistedMap = PersistedMap {
        lockfile_integrity: Integrity::from_bytes(HashAlgorithm::Sha512, lockfile_bytes),
        built_at: now_micros(),
        map: map.clone(),
    };

    let path: PathBuf = map_file_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json: String = serde_json::to_string(&persisted)?;
    let temp_path: PathBuf = path.with_extension("tmp");
    std::fs::write(&temp_path, json)?;
    std::fs::rename(&temp_path, &path)?;

    debug!(
        path = %path.display(),
        files = persisted.map.file_count(),
        "package map persisted"
    );
    Ok(persisted)
}

/// Load the persisted map for `project_root`.
///
/// # Returns
/// `None` when no map has been persisted yet.
pub fn load(project_root: &Path) -> Result<Option<PersistedMap>, ModelError> {
    let path: PathBuf = map_file_path(project_root);
    let json: String = match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let persisted: PersistedMap = serde_json::from_str(&json)?;
    Ok(Some(persisted))
}

/// Check the seal against the current lockfile bytes.
pub fn verify(persisted: &PersistedMap, lockfile_bytes: &[u8]) -> bool {
    persisted.lockfile_integrity.matches(lockfile_bytes)
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
