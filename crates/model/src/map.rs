//! The package map: a finite tree mapping dependency-root-relative paths to
//! content-addressed file entries.
//!
//! The map is pure data. Resolving a path means walking the tree by segment;
//! building it means a deterministic walk of the lockfile (packages in
//! `BTreeMap` order, parents before their nested dependencies, file names in
//! sorted order), so two builds from the same lockfile yield identical maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::integrity::Integrity;
use crate::lockfile::{LockedPackage, Lockfile};

/// Name of the dependency directory the map is rooted at.
pub const DEP_DIR: &str = "node_modules";

/// A file entry in the package map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Content digest; the blob's identity in the store.
    pub integrity: Integrity,
    /// File size in bytes.
    pub size: u64,
    /// 9-bit POSIX permission bits.
    pub mode: u32,
}

/// A directory entry: a mapping from name component to child entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub children: BTreeMap<String, MapEntry>,
}

/// One node of the package map tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MapEntry {
    File(FileEntry),
    Dir(DirEntry),
}

/// The package map, rooted at the project's dependency directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMap {
    pub root: DirEntry,
}

impl PackageMap {
    /// Build the map from a lockfile.
    ///
    /// Each package lands at `<name>` under its parent's dependency
    /// directory; each of its files contributes one file entry, with
    /// intermediate directories created implicitly.
    pub fn build(lockfile: &Lockfile) -> Self {
        let mut root: DirEntry = DirEntry::default();
        insert_packages(&mut root, &lockfile.dependencies);
        Self { root }
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Walk the tree by a `/`-separated path relative to the dependency root.
    ///
    /// # Returns
    /// The entry at that path, or `None` if any segment is missing.
    pub fn entry_at(&self, rel_path: &str) -> Option<&MapEntry> {
        let mut current: &DirEntry = &self.root;
        let mut segments = rel_path.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = segments.next() {
            let entry: &MapEntry = current.children.get(segment)?;
            if segments.peek().is_none() {
                return Some(entry);
            }
            match entry {
                MapEntry::Dir(dir) => current = dir,
                MapEntry::File(_) => return None,
            }
        }
        None
    }

    /// Total number of file entries in the tree.
    pub fn file_count(&self) -> usize {
        fn count(dir: &DirEntry) -> usize {
            dir.children
                .values()
                .map(|entry| match entry {
                    MapEntry::File(_) => 1,
                    MapEntry::Dir(d) => count(d),
                })
                .sum()
        }
        count(&self.root)
    }
}

fn insert_packages(dir: &mut DirEntry, packages: &BTreeMap<String, LockedPackage>) {
    for (name, package) in packages {
        let package_dir: &mut DirEntry = ensure_dir_path(dir, name);
        for (rel_path, spec) in &package.files {
            insert_file(
                package_dir,
                rel_path,
                FileEntry {
                    integrity: spec.integrity.clone(),
                    size: spec.size,
                    mode: spec.mode,
                },
            );
        }
        if !package.dependencies.is_empty() {
            let nested: &mut DirEntry = ensure_dir_path(package_dir, DEP_DIR);
            insert_packages(nested, &package.dependencies);
        }
    }
}

/// Get or create the directory at a `/`-separated relative path.
fn ensure_dir_path<'a>(dir: &'a mut DirEntry, rel_path: &str) -> &'a mut DirEntry {
    let mut current: &mut DirEntry = dir;
    for segment in rel_path.split('/').filter(|s| !s.is_empty()) {
        current = ensure_dir(current, segment);
    }
    current
}

fn ensure_dir<'a>(dir: &'a mut DirEntry, name: &str) -> &'a mut DirEntry {
    let entry: &mut MapEntry = dir
        .children
        .entry(name.to_string())
        .or_insert_with(|| MapEntry::Dir(DirEntry::default()));
    if matches!(entry, MapEntry::File(_)) {
        // A later directory claim wins over an earlier file at the same name.
        *entry = MapEntry::Dir(DirEntry::default());
    }
    match entry {
        MapEntry::Dir(d) => d,
        MapEntry::File(_) => unreachable!("entry was just replaced with a directory"),
    }
}

fn insert_file(dir: &mut DirEntry, rel_path: &str, entry: FileEntry) {
    let (parent_path, name): (&str, &str) = match rel_path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", rel_path),
    };
    let parent: &mut DirEntry = ensure_dir_path(dir, parent_path);
    parent.children.insert(name.to_string(), MapEntry::File(entry));
}
