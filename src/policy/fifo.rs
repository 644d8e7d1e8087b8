//! First In, First Out replacement policy.
//!
//! A doubly-linked list threaded through the arena slot metas; the tail
//! is the newest insertion. Accesses never reorder anything, and
//! pinning or dirtying an entry only makes it un-evictable; the queue
//! position is fixed at insert time. Victim selection scans from the
//! head (oldest) toward the tail and returns the first entry that
//! satisfies the eviction predicate.

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// FIFO per-entry fields: queue neighbours.
#[derive(Debug, Default)]
pub struct FifoMeta {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// FIFO policy state: queue anchors. Head is oldest, tail is newest.
#[derive(Debug)]
pub struct FifoPolicy {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl FifoPolicy {
    fn detach<K, V>(&mut self, arena: &mut SlotArena<K, V, FifoMeta>, id: SlotId) {
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

    fn attach_tail<K, V>(&mut self, arena: &mut SlotArena<K, V, FifoMeta>, id: SlotId) {
        let old_tail = self.tail;
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = old_tail;
            slot.meta.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(slot) = arena.get_mut(t) {
                    slot.meta.next = Some(id);
                }
            },
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }
}

impl<K, V> EvictionPolicy<K, V> for FifoPolicy {
    type Meta = FifoMeta;

    fn new(_capacity: usize) -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn on_access(&mut self, _arena: &mut SlotArena<K, V, FifoMeta>, _id: SlotId) {}

    fn on_insert(&mut self, arena: &mut SlotArena<K, V, FifoMeta>, id: SlotId) {
        self.attach_tail(arena, id);
    }

    fn on_remove(&mut self, arena: &mut SlotArena<K, V, FifoMeta>, id: SlotId) {
        self.detach(arena, id);
    }

    fn pick_victim<F>(&mut self, arena: &mut SlotArena<K, V, FifoMeta>, evictable: F) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, FifoMeta>) -> bool,
    {
        let mut current = self.head;
        while let Some(id) = current {
            let slot = arena.get(id)?;
            if evictable(slot) {
                return Some(id);
            }
            current = slot.meta.next;
        }
        None
    }

    fn reset(&mut self) {
        self.head = None;
        self.tail = None;
    }

    fn debug_validate(&self, arena: &SlotArena<K, V, FifoMeta>) {
        let mut count = 0usize;
        let mut prev = None;
        let mut current = self.head;
        while let Some(id) = current {
            let slot = arena.get(id).expect("queue id points at invalid slot");
            assert_eq!(slot.meta.prev, prev, "prev link broken");
            prev = Some(id);
            current = slot.meta.next;
            count += 1;
            assert!(count <= arena.len(), "cycle in queue");
        }
        assert_eq!(prev, self.tail, "tail anchor broken");
        assert_eq!(count, arena.len(), "queue must contain exactly the valid slots");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::CacheCore;

    type Cache = CacheCore<u64, &'static str, FifoPolicy>;

    #[test]
    fn evicts_in_insertion_order() {
        let mut cache: Cache = CacheCore::new(3);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        cache.insert(4, "d"); // evicts 1
        cache.insert(5, "e"); // evicts 2
        assert!(!cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
        assert!(cache.contains(&5));
    }

    #[test]
    fn lookups_never_reorder() {
        let mut cache: Cache = CacheCore::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.lookup(&1), Some("a"));
        assert_eq!(cache.lookup(&1), Some("a"));
        cache.insert(3, "c"); // still evicts 1, the oldest
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
    }

    #[test]
    fn dirty_head_is_skipped_without_reordering() {
        let mut cache: Cache = CacheCore::new(2);
        cache.insert(1, "a");
        cache.mark_dirty(&1);
        cache.insert(2, "b");
        assert!(cache.insert(3, "c")); // evicts 2, not the dirty 1
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));

        // once clean, 1 is the preferred victim again
        cache.mark_clean(&1);
        assert!(cache.insert(4, "d"));
        assert!(!cache.contains(&1));
    }

    #[test]
    fn evict_one_drains_in_insertion_order() {
        let mut cache: Cache = CacheCore::new(4);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        cache.insert(4, "d");
        cache.lookup(&4);
        cache.lookup(&3);

        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(1));
        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(2));
        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(3));
        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(4));
        assert_eq!(cache.evict_one(), None);
    }

    #[test]
    fn invalidate_middle_keeps_order() {
        let mut cache: Cache = CacheCore::new(3);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        cache.invalidate(&2);
        cache.debug_validate_invariants();
        cache.insert(4, "d");
        cache.insert(5, "e"); // evicts 1
        assert!(!cache.contains(&1));
        assert!(cache.contains(&3));
    }
}
