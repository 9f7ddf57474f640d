//! Lockfile format: the verified input the package map is built from.
//!
//! The lockfile records the resolved dependency tree node-style: each package
//! carries its own file manifest (path, integrity, size, mode) and, where the
//! resolution nested it, its own `dependencies` subtree. All collections are
//! `BTreeMap`s so the canonical encoding is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ValidationError};
use crate::integrity::Integrity;

/// One file inside a locked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Content digest of the file.
    pub integrity: Integrity,
    /// File size in bytes.
    pub size: u64,
    /// 9-bit POSIX permission bits.
    #[serde(default = "default_mode")]
    pub mode: u32,
}

impl FileSpec {
    /// Create a file spec with the default mode (0o644).
    pub fn new(integrity: Integrity, size: u64) -> Self {
        Self {
            integrity,
            size,
            mode: default_mode(),
        }
    }

    /// Set the permission bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

fn default_mode() -> u32 {
    0o644
}

/// A resolved package in the lockfile tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedPackage {
    /// Resolved version string.
    pub version: String,
    /// Registry URL the package was resolved from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    /// Digest of the package tarball. Absent only for bundled packages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
    /// Whether the package ships inside its parent's tarball.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bundled: bool,
    /// Package-relative POSIX paths of every file the package contains.
    #[serde(default)]
    pub files: BTreeMap<String, FileSpec>,
    /// Nested dependencies, installed under this package's `node_modules`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, LockedPackage>,
}

impl LockedPackage {
    /// Create a package entry with no files or dependencies.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            resolved: None,
            integrity: None,
            bundled: false,
            files: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Set the tarball digest.
    pub fn with_integrity(mut self, integrity: Integrity) -> Self {
        self.integrity = Some(integrity);
        self
    }

    /// Mark the package as bundled.
    pub fn bundled(mut self) -> Self {
        self.bundled = true;
        self
    }

    /// Add a file to the package manifest.
    pub fn with_file(mut self, path: impl Into<String>, spec: FileSpec) -> Self {
        self.files.insert(path.into(), spec);
        self
    }

    /// Add a nested dependency.
    pub fn with_dependency(mut self, name: impl Into<String>, package: LockedPackage) -> Self {
        self.dependencies.insert(name.into(), package);
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The project lockfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Project name.
    pub name: String,
    /// Project version.
    pub version: String,
    /// Top-level resolved dependencies.
    #[serde(default)]
    pub dependencies: BTreeMap<String, LockedPackage>,
}

impl Lockfile {
    /// Decode and validate a lockfile from JSON bytes.
    ///
    /// # Errors
    /// Returns a parse error for malformed JSON and a validation error for
    /// structurally invalid entries.
    pub fn decode(bytes: &[u8]) -> Result<Self, ModelError> {
        let lockfile: Lockfile = serde_json::from_slice(bytes)?;
        lockfile.validate()?;
        Ok(lockfile)
    }

    /// Encode the lockfile to its canonical JSON string.
    pub fn encode(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validate every package in the tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_packages(&self.dependencies)
    }

    /// Total number of file entries across all packages.
    pub fn file_count(&self) -> usize {
        fn count(deps: &BTreeMap<String, LockedPackage>) -> usize {
            deps.values()
                .map(|p| p.files.len() + count(&p.dependencies))
                .sum()
        }
        count(&self.dependencies)
    }
}

fn validate_packages(deps: &BTreeMap<String, LockedPackage>) -> Result<(), ValidationError> {
    for (name, package) in deps {
        validate_name(name)?;
        if !package.bundled && package.integrity.is_none() {
            return Err(ValidationError::MissingIntegrity { name: name.clone() });
        }
        for (path, spec) in &package.files {
            validate_file_path(name, path)?;
            if spec.mode & !0o777 != 0 {
                return Err(ValidationError::InvalidMode {
                    path: path.clone(),
                    mode: spec.mode,
                });
            }
        }
        validate_packages(&package.dependencies)?;
    }
    Ok(())
}

/// Package names are one path segment, or two for `@scope/name`.
fn validate_name(name: &str) -> Result<(), ValidationError> {
    let segments: Vec<&str> = name.split('/').collect();
    let ok: bool = match segments.as_slice() {
        [single] => is_valid_segment(single),
        [scope, inner] => scope.starts_with('@') && is_valid_segment(scope) && is_valid_segment(inner),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidPackageName(name.to_string()))
    }
}

fn validate_file_path(name: &str, path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') {
        return Err(ValidationError::AbsoluteFilePath {
            name: name.to_string(),
            path: path.to_string(),
        });
    }
    if path.is_empty() || path.split('/').any(|seg| !is_valid_segment(seg)) {
        return Err(ValidationError::EscapingFilePath {
            name: name.to_string(),
            path: path.to_string(),
        });
    }
    Ok(())
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
}
