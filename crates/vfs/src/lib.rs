//! Virtual filesystem overlay for content-addressed package installs.
//!
//! Packages are never unpacked into `node_modules`. Instead, a per-project
//! package map names every file the dependency tree needs by path and
//! content digest, and this crate answers filesystem operations for those
//! paths from the map and the shared blob cache, deferring everything else
//! to the real filesystem.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: Overlay facade (host-style filesystem API, sync + async)
//! Layer 2: Resolver + stat/read services
//! Layer 1: Package map (pkgmap-model) + blob store (pkgmap-store)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pkgmap_vfs::{install_overlay, OverlayConfig};
//!
//! let config = OverlayConfig::new("/var/cache/pkgmap", "/work/project");
//! let overlay = install_overlay(config, &lockfile_bytes)?;
//! let code = overlay.read_file_sync("/work/project/node_modules/a/index.js".as_ref())?;
//! ```
//!
//! # Limitations
//!
//! The overlay is a typed facade: consumers compile against it. Spawned
//! children that call the OS filesystem directly (e.g. through libc) bypass
//! the facade and see only the real filesystem plus whatever has been
//! materialized.

pub mod bridge;
pub mod config;
pub mod error;
pub mod overlay;
pub mod resolver;
pub mod services;
pub mod stats;

pub use bridge::{
    build_and_persist_map, install_overlay, ExtractOptions, PackageExtractor, PackageIdentity,
};
pub use config::OverlayConfig;
pub use error::OverlayError;
pub use overlay::{
    OpenFlags, OpenRoute, Overlay, F_OK, MODULE_STAT_DIR, MODULE_STAT_ENOENT, MODULE_STAT_FILE,
    R_OK, W_OK, X_OK,
};
pub use resolver::{Resolution, Resolver};
pub use services::{FileKind, StatRecord};
pub use stats::{OverlayStats, OverlayStatsCollector};
