//! Overlay operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of overlay activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStats {
    /// Operations served from the map or the blob cache.
    pub map_hits: u64,
    /// Operations passed through to the real filesystem.
    pub passthroughs: u64,
    /// Copy-on-write materializations performed.
    pub materializations: u64,
    /// NOT_FOUND failures synthesised for missing in-domain paths.
    pub synthesized_not_found: u64,
}

/// Shared counters updated on the overlay fast path.
#[derive(Debug, Default)]
pub struct OverlayStatsCollector {
    map_hits: AtomicU64,
    passthroughs: AtomicU64,
    materializations: AtomicU64,
    synthesized_not_found: AtomicU64,
}

impl OverlayStatsCollector {
    pub fn record_map_hit(&self) {
        self.map_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passthrough(&self) {
        self.passthroughs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_materialization(&self) {
        self.materializations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_synthesized_not_found(&self) {
        self.synthesized_not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Collect current counters.
    pub fn snapshot(&self) -> OverlayStats {
        OverlayStats {
            map_hits: self.map_hits.load(Ordering::Relaxed),
            passthroughs: self.passthroughs.load(Ordering::Relaxed),
            materializations: self.materializations.load(Ordering::Relaxed),
            synthesized_not_found: self.synthesized_not_found.load(Ordering::Relaxed),
        }
    }
}
