//! Stat and read services over resolutions.
//!
//! These produce stat records consistent with the package map and read blob
//! contents through the store. Both are pure apart from the optional
//! blob-existence check and the read itself.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pkgmap_store::BlobStore;

use crate::error::OverlayError;
use crate::resolver::Resolution;

/// Kind of a stat subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
}

/// A stat record, synthetic for map entries and converted from host
/// metadata for real paths.
///
/// `mtime` and `ino` are synthetic for map entries but stable across a
/// process lifetime for a given path and digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
    /// Size in bytes.
    pub size: u64,
    /// 9-bit POSIX permission bits.
    pub mode: u32,
    /// File or directory.
    pub kind: FileKind,
    /// Modification time.
    pub mtime: SystemTime,
    /// Inode number.
    pub ino: u64,
}

impl StatRecord {
    /// Whether the record describes a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }
}

/// Produce a stat record for a resolution.
///
/// # Arguments
/// * `resolution` - Resolver classification of `path`
/// * `path` - The requested absolute path (directory inos derive from it)
/// * `built_at_micros` - Map build time; the synthetic mtime
/// * `store` - Blob store, consulted only when `verify` is set
/// * `verify` - Also require the file's blob to be present in the store
pub fn stat(
    resolution: &Resolution<'_>,
    path: &Path,
    built_at_micros: i64,
    store: &BlobStore,
    verify: bool,
) -> Result<StatRecord, OverlayError> {
    match resolution {
        Resolution::Untracked | Resolution::Missing => Err(OverlayError::NotFound {
            op: "stat",
            path: path.to_path_buf(),
        }),
        Resolution::Dir(_) => Ok(StatRecord {
            size: 0,
            mode: 0o755,
            kind: FileKind::Dir,
            mtime: epoch_micros(built_at_micros),
            ino: fnv1a64(path.to_string_lossy().as_bytes()),
        }),
        Resolution::File(entry) => {
            if verify && !store.contains(&entry.integrity) {
                return Err(OverlayError::NotFound {
                    op: "stat",
                    path: path.to_path_buf(),
                });
            }
            Ok(StatRecord {
                size: entry.size,
                mode: entry.mode,
                kind: FileKind::File,
                mtime: epoch_micros(built_at_micros),
                ino: entry.integrity.ino(),
            })
        }
    }
}

/// Read the full contents for a resolution.
///
/// # Errors
/// `IsDirectory` for a directory, `NotFound` for missing or untracked paths,
/// and the store's own errors for the blob read (a corrupt blob is never
/// reported as missing).
pub fn read(
    resolution: &Resolution<'_>,
    path: &Path,
    store: &BlobStore,
) -> Result<Vec<u8>, OverlayError> {
    match resolution {
        Resolution::Untracked | Resolution::Missing => Err(OverlayError::NotFound {
            op: "open",
            path: path.to_path_buf(),
        }),
        Resolution::Dir(_) => Err(OverlayError::IsDirectory {
            op: "read",
            path: path.to_path_buf(),
        }),
        Resolution::File(entry) => Ok(store.read_all(&entry.integrity)?),
    }
}

fn epoch_micros(micros: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(micros.max(0) as u64)
}

/// FNV-1a over `bytes`; used for directory inode numbers.
pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash: u64 = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
