use std::sync::atomic::{AtomicUsize, Ordering};

/// Runtime search-quality knobs, shared across every collection on a node.
///
/// Stored as atomics so concurrent searches observe updates without
/// taking a lock on the hot path.
#[derive(Debug)]
pub struct GlobalConfig {
    /// Search depth (`ef_search`): higher is more accurate and slower.
    pub ef_search: AtomicUsize,
    /// Build quality (`ef_construction`): higher produces a better graph
    /// at higher indexing cost.
    pub ef_construction: AtomicUsize,
    /// Max neighbors per HNSW node (`M`).
    pub hnsw_m: AtomicUsize,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self {
            ef_search: AtomicUsize::new(100),
            ef_construction: AtomicUsize::new(200),
            hnsw_m: AtomicUsize::new(16),
        }
    }

    pub fn get_ef_search(&self) -> usize {
        self.ef_search.load(Ordering::Relaxed)
    }

    pub fn set_ef_search(&self, val: usize) {
        self.ef_search.store(val, Ordering::Relaxed);
    }

    pub fn get_ef_construction(&self) -> usize {
        self.ef_construction.load(Ordering::Relaxed)
    }

    pub fn set_ef_construction(&self, val: usize) {
        self.ef_construction.store(val, Ordering::Relaxed);
    }

    pub fn get_hnsw_m(&self) -> usize {
        self.hnsw_m.load(Ordering::Relaxed)
    }

    pub fn set_hnsw_m(&self, val: usize) {
        self.hnsw_m.store(val, Ordering::Relaxed);
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.get_ef_search(), 100);
        assert_eq!(cfg.get_ef_construction(), 200);
        assert_eq!(cfg.get_hnsw_m(), 16);
    }

    #[test]
    fn knobs_are_mutable_without_a_lock() {
        let cfg = GlobalConfig::default();
        cfg.set_ef_search(256);
        assert_eq!(cfg.get_ef_search(), 256);
    }
}
