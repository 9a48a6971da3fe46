//! Per-node bounding boxes keyed by time.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::util::{BBox3d, TimeCode};

/// Computed extents by evaluation time.
///
/// Values are handed out as `Arc`s; a hit returns the same allocation.
#[derive(Default)]
pub struct BoundingBoxCache {
    entries: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    boxes: BTreeMap<TimeCode, Arc<BBox3d>>,
    /// Bumped by every `clear`.
    generation: u64,
}

impl BoundingBoxCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached box at `time`, computing it with `compute` on a miss.
    ///
    /// `compute` runs without the cache lock held. A result computed
    /// across a `clear` is returned but not cached.
    pub fn get_or_compute(&self, time: TimeCode, compute: impl FnOnce() -> BBox3d) -> Arc<BBox3d> {
        let generation = {
            let entries = self.entries.lock();
            if let Some(hit) = entries.boxes.get(&time) {
                return hit.clone();
            }
            entries.generation
        };
        let computed = Arc::new(compute());
        let mut entries = self.entries.lock();
        if entries.generation != generation {
            tracing::trace!(time = time.value(), "bounds invalidated during compute, not cached");
            return computed;
        }
        // A racing caller may have filled the slot meanwhile; keep the first.
        entries.boxes.entry(time).or_insert(computed).clone()
    }

    pub fn get(&self, time: TimeCode) -> Option<Arc<BBox3d>> {
        self.entries.lock().boxes.get(&time).cloned()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.boxes.clear();
        entries.generation = entries.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().boxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::DVec3;

    #[test]
    fn test_hit_returns_same_value() {
        let cache = BoundingBoxCache::new();
        let mut calls = 0;
        let a = cache.get_or_compute(TimeCode(1.0), || {
            calls += 1;
            BBox3d::new(DVec3::ZERO, DVec3::ONE)
        });
        let b = cache.get_or_compute(TimeCode(1.0), || {
            calls += 1;
            BBox3d::EMPTY
        });
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_clear_drops_all_times() {
        let cache = BoundingBoxCache::new();
        cache.get_or_compute(TimeCode(1.0), || BBox3d::EMPTY);
        cache.get_or_compute(TimeCode(2.0), || BBox3d::EMPTY);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(TimeCode(1.0)).is_none());
    }

    #[test]
    fn test_clear_during_compute_is_not_cached() {
        let cache = BoundingBoxCache::new();
        let stale = cache.get_or_compute(TimeCode(1.0), || {
            cache.clear();
            BBox3d::EMPTY
        });
        assert!(stale.is_empty());
        assert!(cache.is_empty());

        let fresh = cache.get_or_compute(TimeCode(1.0), || BBox3d::new(DVec3::ZERO, DVec3::ONE));
        assert_eq!(fresh.max, DVec3::ONE);
        assert!(Arc::ptr_eq(&fresh, &cache.get(TimeCode(1.0)).unwrap()));
    }
}
