//! Package map model.
//!
//! This crate provides the pure-data core of the package map engine:
//! - Integrity digests (`<algorithm>-<base64>`) as blob identity
//! - The lockfile format the map is built from
//! - The package map tree and its deterministic build
//! - Persistence with a lockfile seal for drift detection

pub mod error;
pub mod integrity;
pub mod lockfile;
pub mod map;
pub mod persist;

pub use error::{IntegrityError, ModelError, ValidationError};
pub use integrity::{HashAlgorithm, Integrity};
pub use lockfile::{FileSpec, LockedPackage, Lockfile};
pub use map::{DirEntry, FileEntry, MapEntry, PackageMap, DEP_DIR};
pub use persist::{map_file_path, PersistedMap, MAP_FILE_NAME};
