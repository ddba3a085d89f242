//! Bounded cache of lookup results, used to short-circuit repeated lookups.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::common::{Id, RingPosition};

/// Default number of remembered lookup targets.
pub const DEFAULT_HINT_CAPACITY: usize = 4096;

#[derive(Debug)]
/// Maps a looked up [RingPosition] to the successor a past lookup found for it.
///
/// Both [HintCache::insert] and [HintCache::get] touch the entry, and inserting
/// beyond capacity evicts the least recently touched one.
pub struct HintCache {
    cache: LruCache<RingPosition, Id>,
}

impl HintCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    // === Public Methods ===

    pub fn insert(&mut self, target: RingPosition, successor: Id) {
        self.cache.put(target, successor);
    }

    pub fn get(&mut self, target: &RingPosition) -> Option<Id> {
        self.cache.get(target).copied()
    }

    /// Drop every hint pointing at `id`.
    pub fn forget(&mut self, id: &Id) {
        let stale = self
            .cache
            .iter()
            .filter(|(_, successor)| *successor == id)
            .map(|(target, _)| *target)
            .collect::<Vec<_>>();

        for target in stale {
            self.cache.pop(&target);
        }
    }
}

impl Default for HintCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_HINT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hints(capacity: usize) -> HintCache {
        HintCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn insert_then_get() {
        let mut cache = hints(3);
        let id = Id::random();

        cache.insert(RingPosition(7), id);

        assert_eq!(cache.get(&RingPosition(7)), Some(id));
        assert_eq!(cache.get(&RingPosition(8)), None);
    }

    #[test]
    fn evicts_least_recently_touched() {
        let mut cache = hints(3);

        let a = Id::random();
        let b = Id::random();
        let c = Id::random();
        let d = Id::random();

        cache.insert(RingPosition(1), a);
        cache.insert(RingPosition(2), b);
        cache.insert(RingPosition(3), c);

        // Touch the oldest, so the second oldest becomes the eviction candidate.
        assert_eq!(cache.get(&RingPosition(1)), Some(a));

        cache.insert(RingPosition(4), d);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&RingPosition(2)), None);
        assert_eq!(cache.get(&RingPosition(1)), Some(a));
        assert_eq!(cache.get(&RingPosition(3)), Some(c));
        assert_eq!(cache.get(&RingPosition(4)), Some(d));
    }

    #[test]
    fn reinsert_updates_and_touches() {
        let mut cache = hints(2);

        let a = Id::random();
        let b = Id::random();
        let newer = Id::random();

        cache.insert(RingPosition(1), a);
        cache.insert(RingPosition(2), b);
        cache.insert(RingPosition(1), newer);
        cache.insert(RingPosition(3), a);

        assert_eq!(cache.get(&RingPosition(2)), None);
        assert_eq!(cache.get(&RingPosition(1)), Some(newer));
    }

    #[test]
    fn forget_drops_hints_for_node() {
        let mut cache = hints(4);

        let dead = Id::random();
        let alive = Id::random();

        cache.insert(RingPosition(1), dead);
        cache.insert(RingPosition(2), alive);
        cache.insert(RingPosition(3), dead);

        cache.forget(&dead);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&RingPosition(2)), Some(alive));
    }
}
