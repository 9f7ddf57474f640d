//! End-to-end overlay behaviour over a populated cache.

mod common;

use std::io::Read as _;
use std::path::PathBuf;

use common::{fixture, Fixture, BINFILE, INDEX_JS, PACKAGE_JSON};
use pkgmap_vfs::{
    install_overlay, FileKind, OpenFlags, Overlay, OverlayConfig, OverlayError, F_OK, R_OK, W_OK,
};

#[test]
fn read_file_serves_blob_content() {
    let fx: Fixture = fixture();
    let data: Vec<u8> = fx.overlay.read_file_sync(&fx.dep_path("a/index.js")).unwrap();
    assert_eq!(data, INDEX_JS);
    assert_eq!(String::from_utf8(data).unwrap(), "module.x=1;");
}

#[test]
fn read_missing_in_domain_is_enoent() {
    let fx: Fixture = fixture();
    let error: OverlayError = fx
        .overlay
        .read_file_sync(&fx.dep_path("a/missing.js"))
        .unwrap_err();
    assert_eq!(error.code(), Some("ENOENT"));
    assert_eq!(error.errno(), Some(-2));
}

#[test]
fn read_file_on_map_directory_is_eisdir() {
    let fx: Fixture = fixture();
    let error: OverlayError = fx.overlay.read_file_sync(&fx.dep_path("a")).unwrap_err();
    assert_eq!(error.code(), Some("EISDIR"));
    assert_eq!(error.errno(), Some(-21));
}

#[test]
fn readdir_merges_real_and_map_entries() {
    let fx: Fixture = fixture();
    let real_dir: PathBuf = fx.dep_path("a");
    std::fs::create_dir_all(&real_dir).unwrap();
    std::fs::write(real_dir.join("package.json"), PACKAGE_JSON).unwrap();
    std::fs::write(real_dir.join("real-only.txt"), b"real").unwrap();

    let names: Vec<String> = fx.overlay.read_dir_sync(&real_dir).unwrap();
    assert_eq!(
        names,
        vec![
            "binfile".to_string(),
            "index.js".to_string(),
            "package.json".to_string(),
            "real-only.txt".to_string(),
        ]
    );
}

#[test]
fn readdir_serves_map_children_without_real_dir() {
    let fx: Fixture = fixture();
    let names: Vec<String> = fx.overlay.read_dir_sync(&fx.dep_path("a")).unwrap();
    assert_eq!(names, vec!["binfile", "index.js", "package.json"]);
}

#[test]
fn readdir_on_map_file_is_enotdir() {
    let fx: Fixture = fixture();
    let error: OverlayError = fx
        .overlay
        .read_dir_sync(&fx.dep_path("a/index.js"))
        .unwrap_err();
    assert_eq!(error.code(), Some("ENOTDIR"));
    assert_eq!(error.errno(), Some(-20));
}

#[test]
fn stat_missing_is_enoent_but_virtual_node_modules_succeeds() {
    let fx: Fixture = fixture();

    let error: OverlayError = fx
        .overlay
        .stat_sync(&fx.dep_path("nonexistent"))
        .unwrap_err();
    assert_eq!(error.code(), Some("ENOENT"));

    let record = fx
        .overlay
        .stat_sync(&fx.dep_path("nonexistent/node_modules"))
        .unwrap();
    assert_eq!(record.kind, FileKind::Dir);
    assert_eq!(record.size, 0);
    assert_eq!(record.mode, 0o755);
}

#[test]
fn stat_records_are_stable() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/index.js");

    let first = fx.overlay.stat_sync(&path).unwrap();
    let second = fx.overlay.stat_sync(&path).unwrap();
    assert_eq!(first.size, second.size);
    assert_eq!(first.mode, second.mode);
    assert_eq!(first.kind, second.kind);
    assert_eq!(first.ino, second.ino);

    assert_eq!(first.size, INDEX_JS.len() as u64);
    assert_eq!(first.mode, 0o644);
    assert_eq!(first.kind, FileKind::File);
}

#[test]
fn read_only_open_is_zero_copy() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/binfile");

    let mut file: std::fs::File = fx.overlay.open_sync(&path, OpenFlags::read_only()).unwrap();
    let mut data: Vec<u8> = Vec::new();
    file.read_to_end(&mut data).unwrap();
    assert_eq!(data, BINFILE);

    // Nothing was written at the nominal path.
    assert!(!path.exists());
}

#[test]
fn write_open_materializes_with_blob_content() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/binfile");

    let file: std::fs::File = fx.overlay.open_sync(&path, OpenFlags::write_only()).unwrap();
    drop(file);

    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), BINFILE);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode: u32 = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    // The real file wins for subsequent stats.
    let record = fx.overlay.stat_sync(&path).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let real_ino: u64 = std::fs::metadata(&path).unwrap().ino();
        assert_eq!(record.ino, real_ino);
    }
    assert_eq!(record.kind, FileKind::File);
}

#[test]
fn overwriting_materialized_file_does_not_touch_blob() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/binfile");

    fx.overlay.open_sync(&path, OpenFlags::write_only()).unwrap();
    std::fs::write(&path, b"locally changed").unwrap();

    assert_eq!(
        fx.overlay.read_file_sync(&path).unwrap(),
        b"locally changed"
    );
    let digest = pkgmap_model::Integrity::from_bytes(pkgmap_model::HashAlgorithm::Sha512, BINFILE);
    assert_eq!(fx.store.read_all(&digest).unwrap(), BINFILE);
}

#[test]
fn unlink_removes_real_copy_and_map_entry_survives() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/binfile");

    fx.overlay.open_sync(&path, OpenFlags::write_only()).unwrap();
    std::fs::write(&path, b"locally changed").unwrap();
    fx.overlay.unlink_sync(&path).unwrap();

    assert!(!path.exists());
    assert_eq!(fx.overlay.read_file_sync(&path).unwrap(), BINFILE);
}

#[test]
fn access_on_map_directory_rejects_write_and_execute() {
    let fx: Fixture = fixture();
    let dir: PathBuf = fx.dep_path("a");

    fx.overlay.access_sync(&dir, F_OK).unwrap();
    fx.overlay.access_sync(&dir, R_OK).unwrap();

    let error: OverlayError = fx.overlay.access_sync(&dir, W_OK).unwrap_err();
    assert_eq!(error.code(), Some("EACCES"));
    assert_eq!(error.errno(), Some(-13));
}

#[test]
fn access_on_map_file_checks_the_cache_copy() {
    let fx: Fixture = fixture();
    fx.overlay
        .access_sync(&fx.dep_path("a/index.js"), R_OK)
        .unwrap();
}

#[test]
fn exists_reflects_map_and_real_state() {
    let fx: Fixture = fixture();
    assert!(fx.overlay.exists_sync(&fx.dep_path("a")));
    assert!(fx.overlay.exists_sync(&fx.dep_path("a/index.js")));
    assert!(!fx.overlay.exists_sync(&fx.dep_path("a/missing.js")));
    assert!(!fx.overlay.exists_sync(&fx.dep_path("ghost")));
}

#[test]
fn realpath_points_map_files_into_the_cache() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/index.js");

    let real: PathBuf = fx.overlay.realpath_sync(&path).unwrap();
    let digest = pkgmap_model::Integrity::from_bytes(pkgmap_model::HashAlgorithm::Sha512, INDEX_JS);
    assert_eq!(real, fx.store.path_for(&digest));
}

#[test]
fn chmod_on_map_directory_creates_the_real_directory() {
    let fx: Fixture = fixture();
    let dir: PathBuf = fx.dep_path("a");

    fx.overlay.chmod_sync(&dir, 0o700).unwrap();
    assert!(dir.is_dir());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode: u32 = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }
}

#[test]
fn chmod_on_map_file_materializes_then_applies_mode() {
    let fx: Fixture = fixture();
    let path: PathBuf = fx.dep_path("a/binfile");

    fx.overlay.chmod_sync(&path, 0o600).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), BINFILE);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode: u32 = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

#[test]
fn untracked_paths_pass_through_transparently() {
    let fx: Fixture = fixture();
    let outside: PathBuf = fx.project.path().join("src.js");
    std::fs::write(&outside, b"let y = 2;").unwrap();

    assert_eq!(fx.overlay.read_file_sync(&outside).unwrap(), b"let y = 2;");
    let record = fx.overlay.stat_sync(&outside).unwrap();
    assert_eq!(record.size, 10);

    let missing: PathBuf = fx.project.path().join("absent.js");
    let overlay_err: OverlayError = fx.overlay.read_file_sync(&missing).unwrap_err();
    let real_err: std::io::Error = std::fs::read(&missing).unwrap_err();
    assert_eq!(overlay_err.code(), Some("ENOENT"));
    assert_eq!(real_err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn missing_blob_presents_as_enoent() {
    let fx: Fixture = fixture();
    let digest = pkgmap_model::Integrity::from_bytes(pkgmap_model::HashAlgorithm::Sha512, INDEX_JS);
    std::fs::remove_file(fx.store.path_for(&digest)).unwrap();

    let error: OverlayError = fx
        .overlay
        .read_file_sync(&fx.dep_path("a/index.js"))
        .unwrap_err();
    assert_eq!(error.code(), Some("ENOENT"));
}

#[test]
fn corrupt_blob_is_an_integrity_error_not_enoent() {
    let fx: Fixture = fixture();
    let digest = pkgmap_model::Integrity::from_bytes(pkgmap_model::HashAlgorithm::Sha512, INDEX_JS);
    std::fs::write(fx.store.path_for(&digest), b"tampered").unwrap();

    let error: OverlayError = fx
        .overlay
        .read_file_sync(&fx.dep_path("a/index.js"))
        .unwrap_err();
    assert_eq!(error.code(), None);
    assert!(matches!(
        error,
        OverlayError::Store(pkgmap_store::StoreError::Corrupt { .. })
    ));
}

#[test]
fn module_loader_probes_follow_the_resolver() {
    let fx: Fixture = fixture();

    assert_eq!(fx.overlay.module_stat_sync(&fx.dep_path("a/index.js")), 0);
    assert_eq!(fx.overlay.module_stat_sync(&fx.dep_path("a")), 1);
    assert_eq!(
        fx.overlay
            .module_stat_sync(&fx.dep_path("nonexistent/node_modules")),
        1
    );
    assert_eq!(fx.overlay.module_stat_sync(&fx.dep_path("a/missing.js")), -34);

    let outside: PathBuf = fx.project.path().join("main.js");
    std::fs::write(&outside, b"x").unwrap();
    assert_eq!(fx.overlay.module_stat_sync(&outside), 0);
    assert_eq!(fx.overlay.module_stat_sync(fx.project.path()), 1);

    let json: Option<Vec<u8>> = fx
        .overlay
        .module_read_sync(&fx.dep_path("a/package.json"))
        .unwrap();
    assert_eq!(json.as_deref(), Some(PACKAGE_JSON));
    assert!(fx.overlay.module_read_sync(&fx.dep_path("a")).unwrap().is_none());
}

#[test]
fn reinstall_after_lockfile_mutation_rebuilds_map() {
    let fx: Fixture = fixture();

    // Mutate the lockfile after the map was persisted; the stale seal must
    // force a rebuild on the next install.
    let mutated: Vec<u8> = String::from_utf8(fx.lockfile_bytes.clone())
        .unwrap()
        .replace("\"version\":\"1.0.0\"", "\"version\":\"2.0.0\"")
        .into_bytes();
    assert_ne!(mutated, fx.lockfile_bytes);

    let config: OverlayConfig = OverlayConfig::new(fx.cache.path(), fx.project.path())
        .with_case_insensitive_fallback(false);
    let reinstalled: Overlay = install_overlay(config, &mutated).unwrap();

    assert_eq!(
        reinstalled
            .read_file_sync(&fx.dep_path("a/index.js"))
            .unwrap(),
        INDEX_JS
    );
}

#[test]
fn stats_count_overlay_activity() {
    let fx: Fixture = fixture();

    fx.overlay.read_file_sync(&fx.dep_path("a/index.js")).unwrap();
    let _ = fx.overlay.read_file_sync(&fx.dep_path("a/missing.js"));
    fx.overlay
        .open_sync(&fx.dep_path("a/binfile"), OpenFlags::write_only())
        .unwrap();

    let stats = fx.overlay.stats();
    assert!(stats.map_hits >= 1);
    assert!(stats.synthesized_not_found >= 1);
    assert_eq!(stats.materializations, 1);
}
