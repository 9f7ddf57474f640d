//! Path resolution against the package map.
//!
//! The resolver classifies an absolute path as untracked (outside the
//! dependency domain), missing (inside the domain with no entry), or a map
//! directory/file. It is a pure function over an immutable map and never
//! touches disk.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use pkgmap_model::{DirEntry, FileEntry, MapEntry, PackageMap, DEP_DIR};

/// The empty directory served for virtual `node_modules` lookups.
static EMPTY_DIR: DirEntry = DirEntry {
    children: BTreeMap::new(),
};

/// Classification of an absolute path.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    /// Outside the dependency domain; the caller defers to the real
    /// filesystem.
    Untracked,
    /// Inside the dependency domain with no entry; the caller synthesises
    /// NOT_FOUND.
    Missing,
    /// A directory entry in the map.
    Dir(&'a DirEntry),
    /// A file entry in the map.
    File(&'a FileEntry),
}

impl Resolution<'_> {
    /// Whether the path resolved to a map entry.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Resolution::Dir(_) | Resolution::File(_))
    }
}

/// Resolves absolute paths against a package map.
pub struct Resolver {
    map: Arc<PackageMap>,
    dependency_root: PathBuf,
    case_insensitive_fallback: bool,
}

impl Resolver {
    /// Create a resolver.
    ///
    /// # Arguments
    /// * `map` - The immutable package map
    /// * `dependency_root` - Absolute path of the project's `node_modules`
    /// * `case_insensitive_fallback` - Retry segment lookups ignoring ASCII
    ///   case when the exact match misses
    pub fn new(
        map: Arc<PackageMap>,
        dependency_root: PathBuf,
        case_insensitive_fallback: bool,
    ) -> Self {
        Self {
            map,
            dependency_root,
            case_insensitive_fallback,
        }
    }

    /// The dependency root this resolver serves.
    pub fn dependency_root(&self) -> &Path {
        &self.dependency_root
    }

    /// The underlying map.
    pub fn map(&self) -> &PackageMap {
        &self.map
    }

    /// Classify an absolute path.
    ///
    /// A path whose final segment is the dependency-directory name but that
    /// has no map entry resolves to a virtual empty directory, which keeps
    /// recursive module lookup terminating without touching disk.
    pub fn resolve(&self, path: &Path) -> Resolution<'_> {
        let rel: &Path = match path.strip_prefix(&self.dependency_root) {
            Ok(rel) => rel,
            Err(_) => return Resolution::Untracked,
        };

        let mut segments: Vec<&str> = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(name) => match name.to_str() {
                    Some(s) => segments.push(s),
                    None => return Resolution::Untracked,
                },
                Component::CurDir => continue,
                _ => return Resolution::Untracked,
            }
        }

        let mut current: &DirEntry = &self.map.root;
        let last: usize = segments.len().wrapping_sub(1);
        for (i, segment) in segments.iter().copied().enumerate() {
            let child: Option<&MapEntry> = current
                .children
                .get(segment)
                .or_else(|| self.case_fallback(current, segment));
            match child {
                Some(MapEntry::Dir(dir)) if i == last => return Resolution::Dir(dir),
                Some(MapEntry::Dir(dir)) => current = dir,
                Some(MapEntry::File(file)) if i == last => return Resolution::File(file),
                Some(MapEntry::File(_)) | None => return miss(&segments),
            }
        }

        // The dependency root itself.
        Resolution::Dir(current)
    }

    fn case_fallback<'a>(&self, dir: &'a DirEntry, segment: &str) -> Option<&'a MapEntry> {
        if !self.case_insensitive_fallback {
            return None;
        }
        dir.children
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(segment))
            .map(|(_, entry)| entry)
    }
}

fn miss(segments: &[&str]) -> Resolution<'static> {
    if segments.last() == Some(&DEP_DIR) {
        Resolution::Dir(&EMPTY_DIR)
    } else {
        Resolution::Missing
    }
}
