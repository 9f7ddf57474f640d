//! Overlay configuration.

use std::path::PathBuf;

use pkgmap_model::DEP_DIR;

/// Process-wide overlay configuration.
///
/// Created once before the overlay is installed and never mutated; the
/// overlay clones it into an immutable handle.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Root of the content-addressed blob cache.
    pub cache_root: PathBuf,
    /// Project prefix the dependency directory lives under.
    pub project_prefix: PathBuf,
    /// Retry map lookups case-insensitively (one pass per segment) when the
    /// exact-match lookup misses.
    pub case_insensitive_fallback: bool,
}

impl OverlayConfig {
    /// Create a configuration with platform-default lookup semantics.
    ///
    /// # Arguments
    /// * `cache_root` - Root of the blob cache
    /// * `project_prefix` - Project directory containing `node_modules`
    pub fn new(cache_root: impl Into<PathBuf>, project_prefix: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            project_prefix: project_prefix.into(),
            case_insensitive_fallback: cfg!(any(windows, target_os = "macos")),
        }
    }

    /// Override the case-insensitive lookup fallback.
    pub fn with_case_insensitive_fallback(mut self, enabled: bool) -> Self {
        self.case_insensitive_fallback = enabled;
        self
    }

    /// The dependency directory the package map is rooted at.
    pub fn dependency_root(&self) -> PathBuf {
        self.project_prefix.join(DEP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_dependency_root() {
        let config: OverlayConfig = OverlayConfig::new("/cache", "/proj");
        assert_eq!(config.dependency_root(), Path::new("/proj/node_modules"));
    }

    #[test]
    fn test_case_fallback_override() {
        let config: OverlayConfig =
            OverlayConfig::new("/cache", "/proj").with_case_insensitive_fallback(true);
        assert!(config.case_insensitive_fallback);
    }
}
