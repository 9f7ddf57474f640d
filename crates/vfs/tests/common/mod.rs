//! Shared fixture for overlay integration tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tempfile::TempDir;

use pkgmap_model::{FileSpec, HashAlgorithm, Integrity, LockedPackage, Lockfile};
use pkgmap_store::BlobStore;
use pkgmap_vfs::{install_overlay, Overlay, OverlayConfig};

pub const INDEX_JS: &[u8] = b"module.x=1;";
pub const PACKAGE_JSON: &[u8] = b"{\"name\":\"a\",\"version\":\"1.0.0\"}";
pub const BINFILE: &[u8] = &[0x00, 0x01, 0x02, 0x03];

pub struct Fixture {
    pub overlay: Overlay,
    pub store: BlobStore,
    pub lockfile_bytes: Vec<u8>,
    pub project: TempDir,
    pub cache: TempDir,
}

impl Fixture {
    /// Absolute path under the project's dependency root.
    pub fn dep_path(&self, rel: &str) -> PathBuf {
        self.project.path().join("node_modules").join(rel)
    }
}

fn digest(data: &[u8]) -> Integrity {
    Integrity::from_bytes(HashAlgorithm::Sha512, data)
}

/// Build a project with one package `a` (three files) whose blobs are
/// pre-populated in a fresh cache, and install the overlay over it.
pub fn fixture() -> Fixture {
    let project: TempDir = TempDir::new().unwrap();
    let cache: TempDir = TempDir::new().unwrap();

    let store: BlobStore = BlobStore::new(cache.path());
    store.put(INDEX_JS).unwrap();
    store.put(PACKAGE_JSON).unwrap();
    store.put(BINFILE).unwrap();

    let package: LockedPackage = LockedPackage::new("1.0.0")
        .with_integrity(digest(b"a-tarball"))
        .with_file("index.js", FileSpec::new(digest(INDEX_JS), INDEX_JS.len() as u64))
        .with_file(
            "package.json",
            FileSpec::new(digest(PACKAGE_JSON), PACKAGE_JSON.len() as u64),
        )
        .with_file("binfile", FileSpec::new(digest(BINFILE), BINFILE.len() as u64));

    let mut dependencies: BTreeMap<String, LockedPackage> = BTreeMap::new();
    dependencies.insert("a".to_string(), package);
    let lockfile: Lockfile = Lockfile {
        name: "proj".to_string(),
        version: "1.0.0".to_string(),
        dependencies,
    };
    let lockfile_bytes: Vec<u8> = lockfile.encode().unwrap().into_bytes();

    let config: OverlayConfig = OverlayConfig::new(cache.path(), project.path())
        .with_case_insensitive_fallback(false);
    let overlay: Overlay = install_overlay(config, &lockfile_bytes).unwrap();

    Fixture {
        overlay,
        store,
        lockfile_bytes,
        project,
        cache,
    }
}
