//! Installer bridge.
//!
//! The installation orchestrator lives outside this crate; the bridge is the
//! narrow interface between it and the core. The orchestrator hands the core
//! a verified lockfile and an extractor capability; the core builds and
//! persists the package map and installs the overlay.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use pkgmap_model::{persist, Integrity, Lockfile, PackageMap, PersistedMap};

use crate::config::OverlayConfig;
use crate::error::OverlayError;
use crate::overlay::Overlay;

/// Name and version of a package to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
}

/// Options for a package extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Expected tarball digest.
    pub integrity: Option<Integrity>,
    /// Registry URL the package was resolved from.
    pub resolved: Option<String>,
}

/// Capability to materialize a package's files under a target directory.
///
/// The core invokes this only for packages that must exist on the real
/// filesystem (install scripts, bundled dependencies); every other package
/// is represented purely as map entries against pre-populated blobs.
#[async_trait]
pub trait PackageExtractor: Send + Sync {
    /// Extract a package's files into `target_dir`.
    async fn extract(
        &self,
        package: &PackageIdentity,
        target_dir: &Path,
        options: &ExtractOptions,
    ) -> Result<(), OverlayError>;
}

/// Build the package map from lockfile bytes and persist it (with its seal)
/// under the project's dependency directory.
pub fn build_and_persist_map(
    lockfile_bytes: &[u8],
    project_root: &Path,
) -> Result<PersistedMap, OverlayError> {
    let lockfile: Lockfile = Lockfile::decode(lockfile_bytes)?;
    let map: PackageMap = PackageMap::build(&lockfile);
    let persisted: PersistedMap = persist::persist(&map, project_root, lockfile_bytes)?;
    debug!(
        project = %project_root.display(),
        files = persisted.map.file_count(),
        "package map built and persisted"
    );
    Ok(persisted)
}

/// Install the overlay for a project.
///
/// Loads the persisted map and verifies its seal against the current
/// lockfile bytes; a missing or stale map is rebuilt before the overlay is
/// returned. Call once per process, before user code runs.
pub fn install_overlay(
    config: OverlayConfig,
    lockfile_bytes: &[u8],
) -> Result<Overlay, OverlayError> {
    let persisted: PersistedMap = match persist::load(&config.project_prefix)? {
        Some(existing) if persist::verify(&existing, lockfile_bytes) => {
            debug!("package map seal verified");
            existing
        }
        Some(_) => {
            warn!("package map seal does not match the lockfile, rebuilding");
            build_and_persist_map(lockfile_bytes, &config.project_prefix)?
        }
        None => {
            debug!("no persisted package map, building");
            build_and_persist_map(lockfile_bytes, &config.project_prefix)?
        }
    };

    let dependency_root: PathBuf = config.dependency_root();
    info!(
        dependency_root = %dependency_root.display(),
        cache_root = %config.cache_root.display(),
        files = persisted.map.file_count(),
        "overlay installed"
    );
    Ok(Overlay::from_persisted(config, persisted))
}
