//! The filesystem overlay.
//!
//! A typed facade with the same semantic contract as the host's filesystem
//! API. Each operation consults the resolver and either short-circuits to
//! the package map and blob cache, rewrites the request to point into the
//! cache, materializes a file on first mutation, or defers to the real
//! filesystem.
//!
//! The facade holds no per-call state; the blocking core is authoritative
//! and every async form runs it on the tokio blocking pool. Dropping an
//! async future detaches the caller without cancelling the syscall.

mod loader;
mod open;

pub use loader::{MODULE_STAT_DIR, MODULE_STAT_ENOENT, MODULE_STAT_FILE};
pub use open::{OpenFlags, OpenRoute, F_OK, R_OK, W_OK, X_OK};

use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tracing::debug;

use pkgmap_model::{FileEntry, PackageMap, PersistedMap};
use pkgmap_store::BlobStore;

use crate::config::OverlayConfig;
use crate::error::OverlayError;
use crate::resolver::{Resolution, Resolver};
use crate::services::{self, FileKind, StatRecord};
use crate::stats::{OverlayStats, OverlayStatsCollector};

use open::{open_route, OpenDenied};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The installed overlay.
///
/// Cheap to clone; all clones share the same immutable map and counters.
#[derive(Clone)]
pub struct Overlay {
    inner: Arc<OverlayInner>,
}

struct OverlayInner {
    config: OverlayConfig,
    resolver: Resolver,
    store: BlobStore,
    built_at_micros: i64,
    stats: OverlayStatsCollector,
}

impl Overlay {
    /// Create an overlay over a package map.
    ///
    /// # Arguments
    /// * `config` - Immutable overlay configuration
    /// * `map` - The package map, read-only for the process lifetime
    /// * `built_at_micros` - Map build time; served as the synthetic mtime
    pub fn new(config: OverlayConfig, map: PackageMap, built_at_micros: i64) -> Self {
        let resolver: Resolver = Resolver::new(
            Arc::new(map),
            config.dependency_root(),
            config.case_insensitive_fallback,
        );
        let store: BlobStore = BlobStore::new(config.cache_root.clone());
        Self {
            inner: Arc::new(OverlayInner {
                config,
                resolver,
                store,
                built_at_micros,
                stats: OverlayStatsCollector::default(),
            }),
        }
    }

    /// Create an overlay from a loaded persisted map.
    pub fn from_persisted(config: OverlayConfig, persisted: PersistedMap) -> Self {
        let built_at: i64 = persisted.built_at;
        Self::new(config, persisted.map, built_at)
    }

    /// The overlay configuration.
    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    /// The blob store backing this overlay.
    pub fn store(&self) -> &BlobStore {
        &self.inner.store
    }

    /// Current operation counters.
    pub fn stats(&self) -> OverlayStats {
        self.inner.stats.snapshot()
    }

    // --- sync facade -------------------------------------------------------

    /// Stat a path. Real metadata wins; the map answers only on real ENOENT.
    pub fn stat_sync(&self, path: &Path) -> Result<StatRecord, OverlayError> {
        self.inner.stat_core(path, false, false)
    }

    /// Stat a path, additionally requiring map-served files to have their
    /// blob present in the store.
    pub fn stat_verified_sync(&self, path: &Path) -> Result<StatRecord, OverlayError> {
        self.inner.stat_core(path, false, true)
    }

    /// Stat a path without following a final symlink.
    pub fn lstat_sync(&self, path: &Path) -> Result<StatRecord, OverlayError> {
        self.inner.stat_core(path, true, false)
    }

    /// Resolve a path to its canonical location; map files resolve to their
    /// cache path.
    pub fn realpath_sync(&self, path: &Path) -> Result<PathBuf, OverlayError> {
        self.inner.realpath_core(path)
    }

    /// Whether a path exists through the overlay. Never fails.
    pub fn exists_sync(&self, path: &Path) -> bool {
        self.inner.exists_core(path)
    }

    /// Check accessibility of a path for the given mode bits.
    pub fn access_sync(&self, path: &Path, mode: u32) -> Result<(), OverlayError> {
        self.inner.access_core(path, mode)
    }

    /// Read the full contents of a file.
    pub fn read_file_sync(&self, path: &Path) -> Result<Vec<u8>, OverlayError> {
        self.inner.read_file_core(path)
    }

    /// List a directory, merging real entries with map children.
    pub fn read_dir_sync(&self, path: &Path) -> Result<Vec<String>, OverlayError> {
        self.inner.read_dir_core(path)
    }

    /// Open a file with the given flags.
    ///
    /// Read-only opens of map files go straight to the cache (zero-copy);
    /// mutating opens materialize the blob at the real path first.
    pub fn open_sync(&self, path: &Path, flags: OpenFlags) -> Result<std::fs::File, OverlayError> {
        self.inner.open_core(path, flags)
    }

    /// Open a read stream (read-only open).
    pub fn create_read_stream_sync(&self, path: &Path) -> Result<std::fs::File, OverlayError> {
        self.inner.open_core(path, OpenFlags::read_only())
    }

    /// Open a write stream (write/create/truncate open).
    pub fn create_write_stream_sync(&self, path: &Path) -> Result<std::fs::File, OverlayError> {
        self.inner.open_core(path, OpenFlags::write_only())
    }

    /// Change permission bits; the copy-on-write trigger for mode mutations.
    pub fn chmod_sync(&self, path: &Path, mode: u32) -> Result<(), OverlayError> {
        self.inner.chmod_core(path, mode)
    }

    /// Remove the real file at `path`. Pure pass-through: the map entry, if
    /// any, is unaffected.
    pub fn unlink_sync(&self, path: &Path) -> Result<(), OverlayError> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    // --- async facade ------------------------------------------------------

    /// Async form of [`Overlay::stat_sync`].
    pub async fn stat(&self, path: impl Into<PathBuf>) -> Result<StatRecord, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.stat_core(&path, false, false)).await
    }

    /// Async form of [`Overlay::stat_verified_sync`].
    pub async fn stat_verified(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<StatRecord, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.stat_core(&path, false, true)).await
    }

    /// Async form of [`Overlay::lstat_sync`].
    pub async fn lstat(&self, path: impl Into<PathBuf>) -> Result<StatRecord, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.stat_core(&path, true, false)).await
    }

    /// Async form of [`Overlay::realpath_sync`].
    pub async fn realpath(&self, path: impl Into<PathBuf>) -> Result<PathBuf, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.realpath_core(&path)).await
    }

    /// Async form of [`Overlay::exists_sync`].
    pub async fn exists(&self, path: impl Into<PathBuf>) -> bool {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || Ok(inner.exists_core(&path)))
            .await
            .unwrap_or(false)
    }

    /// Async form of [`Overlay::access_sync`].
    pub async fn access(&self, path: impl Into<PathBuf>, mode: u32) -> Result<(), OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.access_core(&path, mode)).await
    }

    /// Async form of [`Overlay::read_file_sync`].
    pub async fn read_file(&self, path: impl Into<PathBuf>) -> Result<Vec<u8>, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.read_file_core(&path)).await
    }

    /// Async form of [`Overlay::read_dir_sync`].
    pub async fn read_dir(&self, path: impl Into<PathBuf>) -> Result<Vec<String>, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.read_dir_core(&path)).await
    }

    /// Async form of [`Overlay::open_sync`].
    pub async fn open(
        &self,
        path: impl Into<PathBuf>,
        flags: OpenFlags,
    ) -> Result<tokio::fs::File, OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        let file: std::fs::File = run_blocking(move || inner.open_core(&path, flags)).await?;
        Ok(tokio::fs::File::from_std(file))
    }

    /// Async form of [`Overlay::create_read_stream_sync`].
    pub async fn create_read_stream(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<tokio::fs::File, OverlayError> {
        self.open(path, OpenFlags::read_only()).await
    }

    /// Async form of [`Overlay::create_write_stream_sync`].
    pub async fn create_write_stream(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<tokio::fs::File, OverlayError> {
        self.open(path, OpenFlags::write_only()).await
    }

    /// Async form of [`Overlay::chmod_sync`].
    pub async fn chmod(&self, path: impl Into<PathBuf>, mode: u32) -> Result<(), OverlayError> {
        let inner: Arc<OverlayInner> = self.inner.clone();
        let path: PathBuf = path.into();
        run_blocking(move || inner.chmod_core(&path, mode)).await
    }

    /// Async form of [`Overlay::unlink_sync`].
    pub async fn unlink(&self, path: impl Into<PathBuf>) -> Result<(), OverlayError> {
        let path: PathBuf = path.into();
        run_blocking(move || {
            std::fs::remove_file(&path)?;
            Ok(())
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, OverlayError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OverlayError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OverlayError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

impl OverlayInner {
    fn resolve(&self, path: &Path) -> Resolution<'_> {
        self.resolver.resolve(path)
    }

    fn synth_not_found(&self, op: &'static str, path: &Path) -> OverlayError {
        self.stats.record_synthesized_not_found();
        debug!(path = %path.display(), op, "synthesized ENOENT for missing map path");
        OverlayError::NotFound {
            op,
            path: path.to_path_buf(),
        }
    }

    fn stat_core(
        &self,
        path: &Path,
        no_follow: bool,
        verify: bool,
    ) -> Result<StatRecord, OverlayError> {
        let real = if no_follow {
            std::fs::symlink_metadata(path)
        } else {
            std::fs::metadata(path)
        };
        match real {
            Ok(metadata) => {
                self.stats.record_passthrough();
                Ok(stat_from_metadata(&metadata))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match self.resolve(path) {
                    Resolution::Untracked => Err(OverlayError::Io(e)),
                    Resolution::Missing => Err(self.synth_not_found("stat", path)),
                    resolution => {
                        self.stats.record_map_hit();
                        services::stat(
                            &resolution,
                            path,
                            self.built_at_micros,
                            &self.store,
                            verify,
                        )
                    }
                }
            }
            Err(e) => Err(OverlayError::Io(e)),
        }
    }

    fn realpath_core(&self, path: &Path) -> Result<PathBuf, OverlayError> {
        match std::fs::canonicalize(path) {
            Ok(real) => {
                self.stats.record_passthrough();
                Ok(real)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match self.resolve(path) {
                Resolution::Untracked => Err(OverlayError::Io(e)),
                Resolution::Missing => Err(self.synth_not_found("realpath", path)),
                Resolution::Dir(_) => {
                    self.stats.record_map_hit();
                    Ok(path.to_path_buf())
                }
                Resolution::File(entry) => {
                    self.stats.record_map_hit();
                    Ok(self.store.path_for(&entry.integrity))
                }
            },
            Err(e) => Err(OverlayError::Io(e)),
        }
    }

    fn exists_core(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Resolution::Untracked => path.exists(),
            Resolution::Missing => false,
            Resolution::Dir(_) => true,
            Resolution::File(entry) => {
                path.exists() || self.store.contains(&entry.integrity)
            }
        }
    }

    fn access_core(&self, path: &Path, mode: u32) -> Result<(), OverlayError> {
        match self.resolve(path) {
            Resolution::Untracked => {
                self.stats.record_passthrough();
                access_real(path, mode)
            }
            Resolution::Missing => Err(self.synth_not_found("access", path)),
            Resolution::Dir(_) => {
                if mode & (W_OK | X_OK) != 0 {
                    Err(OverlayError::AccessDenied {
                        op: "access",
                        path: path.to_path_buf(),
                    })
                } else {
                    self.stats.record_map_hit();
                    Ok(())
                }
            }
            Resolution::File(entry) => {
                self.stats.record_map_hit();
                if path.exists() {
                    access_real(path, mode)
                } else {
                    let cache_path: PathBuf = self.store.path_for(&entry.integrity);
                    access_real(&cache_path, mode).map_err(|e| match e {
                        // The blob is the file's identity; its absence is the
                        // path's absence.
                        OverlayError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                            OverlayError::NotFound {
                                op: "access",
                                path: path.to_path_buf(),
                            }
                        }
                        other => other,
                    })
                }
            }
        }
    }

    fn read_file_core(&self, path: &Path) -> Result<Vec<u8>, OverlayError> {
        match std::fs::read(path) {
            Ok(data) => {
                self.stats.record_passthrough();
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match self.resolve(path) {
                Resolution::Untracked => Err(OverlayError::Io(e)),
                Resolution::Missing => Err(self.synth_not_found("open", path)),
                resolution => {
                    self.stats.record_map_hit();
                    services::read(&resolution, path, &self.store)
                }
            },
            Err(e) => Err(OverlayError::Io(e)),
        }
    }

    fn read_dir_core(&self, path: &Path) -> Result<Vec<String>, OverlayError> {
        let resolution: Resolution<'_> = self.resolve(path);
        match std::fs::read_dir(path) {
            Ok(entries) => {
                let mut names: BTreeSet<String> = BTreeSet::new();
                for entry in entries {
                    names.insert(entry?.file_name().to_string_lossy().into_owned());
                }
                if let Resolution::Dir(dir) = resolution {
                    self.stats.record_map_hit();
                    names.extend(dir.children.keys().cloned());
                } else {
                    self.stats.record_passthrough();
                }
                Ok(names.into_iter().collect())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match resolution {
                Resolution::Untracked => Err(OverlayError::Io(e)),
                Resolution::Missing => Err(self.synth_not_found("scandir", path)),
                Resolution::File(_) => Err(OverlayError::NotDirectory {
                    op: "scandir",
                    path: path.to_path_buf(),
                }),
                Resolution::Dir(dir) => {
                    self.stats.record_map_hit();
                    Ok(dir.children.keys().cloned().collect())
                }
            },
            Err(e) => Err(OverlayError::Io(e)),
        }
    }

    fn open_core(&self, path: &Path, flags: OpenFlags) -> Result<std::fs::File, OverlayError> {
        let resolution: Resolution<'_> = self.resolve(path);
        match open_route(&resolution, &flags) {
            Err(OpenDenied::Missing) => Err(self.synth_not_found("open", path)),
            Err(OpenDenied::IsDirectory) => Err(OverlayError::IsDirectory {
                op: "open",
                path: path.to_path_buf(),
            }),
            Ok(OpenRoute::RealRead) | Ok(OpenRoute::RealWrite) => {
                self.stats.record_passthrough();
                Ok(flags.to_open_options().open(path)?)
            }
            Ok(route) => {
                let entry: &FileEntry = match resolution {
                    Resolution::File(entry) => entry,
                    _ => unreachable!("map routes only arise from file resolutions"),
                };
                // A previously materialized copy wins over the map.
                if path.exists() {
                    self.stats.record_passthrough();
                    return Ok(flags.to_open_options().open(path)?);
                }
                match route {
                    OpenRoute::MapRead => {
                        self.stats.record_map_hit();
                        let cache_path: PathBuf = self.store.path_for(&entry.integrity);
                        debug!(
                            path = %path.display(),
                            cache = %cache_path.display(),
                            "zero-copy open from cache"
                        );
                        std::fs::File::open(&cache_path).map_err(|e| {
                            if e.kind() == std::io::ErrorKind::NotFound {
                                OverlayError::NotFound {
                                    op: "open",
                                    path: path.to_path_buf(),
                                }
                            } else {
                                OverlayError::Io(e)
                            }
                        })
                    }
                    OpenRoute::MapMaterialize => {
                        self.materialize(path, entry)?;
                        Ok(flags.without_truncate().to_open_options().open(path)?)
                    }
                    OpenRoute::RealRead | OpenRoute::RealWrite => unreachable!(),
                }
            }
        }
    }

    fn chmod_core(&self, path: &Path, mode: u32) -> Result<(), OverlayError> {
        match self.resolve(path) {
            Resolution::Untracked => {
                self.stats.record_passthrough();
                set_mode(path, mode)?;
                Ok(())
            }
            Resolution::Missing => Err(self.synth_not_found("chmod", path)),
            Resolution::Dir(_) => {
                std::fs::create_dir_all(path)?;
                set_mode(path, mode)?;
                Ok(())
            }
            Resolution::File(entry) => {
                if !path.exists() {
                    self.materialize(path, entry)?;
                }
                set_mode(path, mode)?;
                Ok(())
            }
        }
    }

    /// Copy a blob to its nominal real path, mode 0o755.
    ///
    /// Publication is temp-write plus rename so a concurrent materialization
    /// of the same path resolves by last-rename-wins.
    fn materialize(&self, path: &Path, entry: &FileEntry) -> Result<(), OverlayError> {
        let data: Vec<u8> = self.store.read_all(&entry.integrity)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let parent: &Path = path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path: PathBuf = parent.join(format!(
            ".pkgmap-materialize.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        {
            let mut file: std::fs::File = std::fs::File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, path)?;
        set_mode(path, 0o755)?;

        self.stats.record_materialization();
        debug!(path = %path.display(), size = data.len(), "materialized blob");
        Ok(())
    }
}

/// Convert host metadata into a stat record.
fn stat_from_metadata(metadata: &std::fs::Metadata) -> StatRecord {
    let kind: FileKind = if metadata.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    let mtime = metadata.modified().unwrap_or(UNIX_EPOCH);

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        StatRecord {
            size: metadata.len(),
            mode: metadata.mode() & 0o777,
            kind,
            mtime,
            ino: metadata.ino(),
        }
    }
    #[cfg(not(unix))]
    {
        let mode: u32 = if metadata.permissions().readonly() {
            0o444
        } else if kind == FileKind::Dir {
            0o755
        } else {
            0o644
        };
        StatRecord {
            size: metadata.len(),
            mode,
            kind,
            mtime,
            ino: 0,
        }
    }
}

/// Emulated `access()` against a real path.
fn access_real(path: &Path, mode: u32) -> Result<(), OverlayError> {
    let metadata: std::fs::Metadata = std::fs::metadata(path).map_err(OverlayError::Io)?;
    if mode & W_OK != 0 && metadata.permissions().readonly() {
        return Err(OverlayError::AccessDenied {
            op: "access",
            path: path.to_path_buf(),
        });
    }
    #[cfg(unix)]
    if mode & X_OK != 0 {
        use std::os::unix::fs::MetadataExt;
        if metadata.mode() & 0o111 == 0 {
            return Err(OverlayError::AccessDenied {
                op: "access",
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let mut permissions: std::fs::Permissions = std::fs::metadata(path)?.permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        std::fs::set_permissions(path, permissions)
    }
}
