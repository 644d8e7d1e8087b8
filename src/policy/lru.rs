//! Least Recently Used replacement policy.
//!
//! A doubly-linked list threaded through the arena slot metas; the head
//! is the MRU end. Insertion counts as use, so both `on_insert` and
//! `on_access` move the entry to the head. Victim selection scans from
//! the tail toward the head and returns the first entry that satisfies
//! the eviction predicate, so pinned or dirty entries near the tail are
//! stepped over without reordering.
//!
//! ```text
//!   head (MRU) ─► [D] ◄──► [B] ◄──► [A] ◄──► [C] ◄─ tail (LRU)
//!
//!   on_access(A):  detach A, attach at head
//!   pick_victim:   C, then A, then B, ... first evictable wins
//! ```

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// LRU per-entry fields: recency-list neighbours.
#[derive(Debug, Default)]
pub struct LruMeta {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// LRU policy state: recency-list anchors.
#[derive(Debug)]
pub struct LruPolicy {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl LruPolicy {
    fn detach<K, V>(&mut self, arena: &mut SlotArena<K, V, LruMeta>, id: SlotId) {
        let (prev, next) = match arena.get(id) {
            Some(slot) => (slot.meta.prev, slot.meta.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(slot) = arena.get_mut(p) {
                    slot.meta.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = arena.get_mut(n) {
                    slot.meta.prev = prev;
                }
            },
            None => self.tail = prev,
        }
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = None;
            slot.meta.next = None;
        }
    }

    fn attach_head<K, V>(&mut self, arena: &mut SlotArena<K, V, LruMeta>, id: SlotId) {
        let old_head = self.head;
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = None;
            slot.meta.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(slot) = arena.get_mut(h) {
                    slot.meta.prev = Some(id);
                }
            },
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }
}

impl<K, V> EvictionPolicy<K, V> for LruPolicy {
    type Meta = LruMeta;

    fn new(_capacity: usize) -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    fn name(&self) -> &'static str {
        "LRU"
    }

    fn on_access(&mut self, arena: &mut SlotArena<K, V, LruMeta>, id: SlotId) {
        if self.head == Some(id) {
            return;
        }
        self.detach(arena, id);
        self.attach_head(arena, id);
    }

    fn on_insert(&mut self, arena: &mut SlotArena<K, V, LruMeta>, id: SlotId) {
        self.attach_head(arena, id);
    }

    fn on_remove(&mut self, arena: &mut SlotArena<K, V, LruMeta>, id: SlotId) {
        self.detach(arena, id);
    }

    fn pick_victim<F>(&mut self, arena: &mut SlotArena<K, V, LruMeta>, evictable: F) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, LruMeta>) -> bool,
    {
        let mut current = self.tail;
        while let Some(id) = current {
            let slot = arena.get(id)?;
            if evictable(slot) {
                return Some(id);
            }
            current = slot.meta.prev;
        }
        None
    }

    fn reset(&mut self) {
        self.head = None;
        self.tail = None;
    }

    fn debug_validate(&self, arena: &SlotArena<K, V, LruMeta>) {
        let mut count = 0usize;
        let mut prev = None;
        let mut current = self.head;
        while let Some(id) = current {
            let slot = arena.get(id).expect("list id points at invalid slot");
            assert_eq!(slot.meta.prev, prev, "prev link broken");
            prev = Some(id);
            current = slot.meta.next;
            count += 1;
            assert!(count <= arena.len(), "cycle in recency list");
        }
        assert_eq!(prev, self.tail, "tail anchor broken");
        assert_eq!(count, arena.len(), "list must contain exactly the valid slots");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::CacheCore;

    type Cache = CacheCore<u64, &'static str, LruPolicy>;

    mod eviction_order {
        use super::*;

        #[test]
        fn evicts_least_recently_used() {
            let mut cache: Cache = CacheCore::new(3);
            assert!(cache.insert(1, "a"));
            assert!(cache.insert(2, "b"));
            assert!(cache.insert(3, "c"));

            assert_eq!(cache.lookup(&1), Some("a"));
            assert!(cache.insert(4, "d")); // 2 is now the LRU

            assert!(cache.contains(&1));
            assert!(!cache.contains(&2));
            assert!(cache.contains(&3));
            assert!(cache.contains(&4));
        }

        #[test]
        fn insert_counts_as_use() {
            let mut cache: Cache = CacheCore::new(2);
            cache.insert(1, "a");
            cache.insert(2, "b");
            cache.insert(3, "c"); // evicts 1, the oldest insertion
            assert!(!cache.contains(&1));
            assert!(cache.contains(&2));
        }

        #[test]
        fn duplicate_insert_refreshes_recency() {
            let mut cache: Cache = CacheCore::new(2);
            cache.insert(1, "a");
            cache.insert(2, "b");
            assert!(!cache.insert(1, "ignored")); // refreshes 1
            cache.insert(3, "c"); // evicts 2
            assert!(cache.contains(&1));
            assert!(!cache.contains(&2));
            // the duplicate insert left the stored value unchanged
            assert_eq!(cache.peek(&1), Some("a"));
        }
    }

    mod predicate_handling {
        use super::*;

        #[test]
        fn pinned_tail_is_skipped() {
            let mut cache: Cache = CacheCore::new(2);
            cache.insert(1, "a");
            cache.insert(2, "b");
            assert!(cache.pin(&1));
            assert!(cache.insert(3, "c")); // 1 is the LRU but pinned; evicts 2
            assert!(cache.contains(&1));
            assert!(!cache.contains(&2));
        }

        #[test]
        fn dirty_tail_is_skipped() {
            let mut cache: Cache = CacheCore::new(2);
            cache.insert(1, "a");
            cache.insert(2, "b");
            assert!(cache.mark_dirty(&1));
            assert!(cache.insert(3, "c"));
            assert!(cache.contains(&1));
            assert!(!cache.contains(&2));
        }

        #[test]
        fn full_cache_with_no_candidate_rejects_insert() {
            let mut cache: Cache = CacheCore::new(2);
            cache.insert(1, "a");
            cache.insert(2, "b");
            cache.pin(&1);
            cache.mark_dirty(&2);
            assert!(!cache.insert(3, "c"));
            assert_eq!(cache.len(), 2);
        }
    }

    mod drain_order {
        use super::*;

        #[test]
        fn evict_one_follows_recency_exactly() {
            let mut cache: Cache = CacheCore::new(4);
            cache.insert(1, "a");
            cache.insert(2, "b");
            cache.insert(3, "c");
            cache.insert(4, "d");
            cache.lookup(&2);
            cache.lookup(&1);

            // recency is now MRU 1, 2, 4, 3
            assert_eq!(cache.evict_one().map(|(k, _)| k), Some(3));
            assert_eq!(cache.evict_one().map(|(k, _)| k), Some(4));
            assert_eq!(cache.evict_one().map(|(k, _)| k), Some(2));
            assert_eq!(cache.evict_one().map(|(k, _)| k), Some(1));
            assert_eq!(cache.evict_one(), None);
            assert!(cache.is_empty());
        }

        #[test]
        fn peek_does_not_disturb_recency() {
            let mut cache: Cache = CacheCore::new(2);
            cache.insert(1, "a");
            cache.insert(2, "b");
            assert_eq!(cache.peek(&1), Some("a"));
            // 1 is still the LRU despite the peek
            assert_eq!(cache.evict_one().map(|(k, _)| k), Some(1));
        }
    }

    mod invariants {
        use super::*;

        #[test]
        fn list_survives_mixed_workload() {
            let mut cache: Cache = CacheCore::new(8);
            for i in 0..32 {
                cache.insert(i, "x");
                if i % 3 == 0 {
                    cache.lookup(&(i / 2));
                }
                if i % 5 == 0 {
                    cache.invalidate(&(i / 3));
                }
                cache.debug_validate_invariants();
            }
        }
    }
}
