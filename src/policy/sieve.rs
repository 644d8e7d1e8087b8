//! SIEVE replacement policy.
//!
//! Same circular-list geometry as CLOCK (doubly-linked cycle threaded
//! through the slot metas, hand pointer) but the per-entry bit is
//! `visited`: set on insertion and on every access, cleared only when
//! the hand passes an evictable entry during a victim scan. Entries
//! that fail the eviction predicate are passed without any bit change,
//! so pinned or dirty entries keep their visited state for the scan in
//! which they become evictable again.
//!
//! The scan walks forward from the hand and returns the first evictable
//! entry whose bit is already clear; if a full revolution only cleared
//! bits, a second revolution finds the victim. Two revolutions with no
//! candidate means nothing satisfies the predicate.

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// SIEVE per-entry fields: cycle neighbours and the visited bit.
#[derive(Debug, Default)]
pub struct SieveMeta {
    prev: Option<SlotId>,
    next: Option<SlotId>,
    visited: bool,
}

/// SIEVE policy state: the scan hand.
#[derive(Debug)]
pub struct SievePolicy {
    hand: Option<SlotId>,
}

impl SievePolicy {
    /// Links `id` at the cycle tail (immediately before the hand).
    fn link_tail<K, V>(&mut self, arena: &mut SlotArena<K, V, SieveMeta>, id: SlotId) {
        let hand = match self.hand {
            Some(h) => h,
            None => {
                if let Some(slot) = arena.get_mut(id) {
                    slot.meta.prev = Some(id);
                    slot.meta.next = Some(id);
                }
                self.hand = Some(id);
                return;
            },
        };
        let tail = match arena.get(hand).and_then(|slot| slot.meta.prev) {
            Some(t) => t,
            None => return,
        };
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = Some(tail);
            slot.meta.next = Some(hand);
        }
        if let Some(slot) = arena.get_mut(tail) {
            slot.meta.next = Some(id);
        }
        if let Some(slot) = arena.get_mut(hand) {
            slot.meta.prev = Some(id);
        }
    }

    fn unlink<K, V>(&mut self, arena: &mut SlotArena<K, V, SieveMeta>, id: SlotId) {
        let (prev, next) = match arena.get(id) {
            Some(slot) => (slot.meta.prev, slot.meta.next),
            None => return,
        };
        if next == Some(id) {
            self.hand = None;
        } else {
            if let (Some(p), Some(n)) = (prev, next) {
                if let Some(slot) = arena.get_mut(p) {
                    slot.meta.next = Some(n);
                }
                if let Some(slot) = arena.get_mut(n) {
                    slot.meta.prev = Some(p);
                }
            }
            if self.hand == Some(id) {
                self.hand = next;
            }
        }
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = None;
            slot.meta.next = None;
            slot.meta.visited = false;
        }
    }
}

impl<K, V> EvictionPolicy<K, V> for SievePolicy {
    type Meta = SieveMeta;

    fn new(_capacity: usize) -> Self {
        Self { hand: None }
    }

    fn name(&self) -> &'static str {
        "SIEVE"
    }

    fn on_access(&mut self, arena: &mut SlotArena<K, V, SieveMeta>, id: SlotId) {
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.visited = true;
        }
    }

    fn on_insert(&mut self, arena: &mut SlotArena<K, V, SieveMeta>, id: SlotId) {
        self.link_tail(arena, id);
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.visited = true;
        }
    }

    fn on_remove(&mut self, arena: &mut SlotArena<K, V, SieveMeta>, id: SlotId) {
        self.unlink(arena, id);
    }

    fn pick_victim<F>(&mut self, arena: &mut SlotArena<K, V, SieveMeta>, evictable: F) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, SieveMeta>) -> bool,
    {
        let mut hand = self.hand?;
        let steps = arena.len().saturating_mul(2);
        for _ in 0..steps {
            let (next, candidate, visited) = {
                let slot = arena.get(hand)?;
                (slot.meta.next, evictable(slot), slot.meta.visited)
            };
            let next = next.unwrap_or(hand);
            if candidate {
                if !visited {
                    self.hand = Some(next);
                    return Some(hand);
                }
                if let Some(slot) = arena.get_mut(hand) {
                    slot.meta.visited = false;
                }
            }
            hand = next;
            self.hand = Some(hand);
        }
        None
    }

    fn reset(&mut self) {
        self.hand = None;
    }

    fn debug_validate(&self, arena: &SlotArena<K, V, SieveMeta>) {
        match self.hand {
            None => assert!(arena.is_empty(), "hand must exist while entries remain"),
            Some(start) => {
                let mut current = start;
                let mut count = 0usize;
                loop {
                    let slot = arena.get(current).expect("cycle id points at invalid slot");
                    let next = slot.meta.next.expect("cycle link missing");
                    let back = arena
                        .get(next)
                        .and_then(|slot| slot.meta.prev)
                        .expect("cycle back-link missing");
                    assert_eq!(back, current, "cycle links must be symmetric");
                    count += 1;
                    assert!(count <= arena.len(), "cycle longer than the valid set");
                    current = next;
                    if current == start {
                        break;
                    }
                }
                assert_eq!(count, arena.len(), "cycle must visit every valid slot");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::CacheCore;

    type Cache = CacheCore<u64, &'static str, SievePolicy>;

    #[test]
    fn visited_entries_get_a_second_chance() {
        let mut cache: Cache = CacheCore::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        // both visited; the scan clears 1 and 2, wraps, evicts 1
        cache.insert(3, "c");
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));

        // 2 has a cleared bit now, 3 is freshly visited
        cache.insert(4, "d");
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn access_rearms_the_bit() {
        let mut cache: Cache = CacheCore::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c"); // evicts 1, clears 2
        assert!(cache.contains(&2));
        cache.lookup(&2); // visited again
        cache.insert(4, "d"); // scan clears 2 and 3, wraps, evicts 2...
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&4));
    }

    #[test]
    fn pinned_entries_are_passed_without_bit_change() {
        let mut cache: Cache = CacheCore::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.pin(&1);
        assert!(cache.insert(3, "c")); // evicts 2
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn no_candidate_after_two_revolutions() {
        let mut cache: Cache = CacheCore::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.pin(&1);
        cache.pin(&2);
        assert!(!cache.insert(3, "c"));
    }

    #[test]
    fn evict_one_prefers_unvisited_entries() {
        let mut cache: Cache = CacheCore::new(3);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");

        // all visited: the scan strips the bits and wraps to take 1
        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(1));

        cache.lookup(&3); // re-arm 3; 2 still has a stripped bit
        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(2));
        assert_eq!(cache.evict_one().map(|(k, _)| k), Some(3));
        assert_eq!(cache.evict_one(), None);
    }

    #[test]
    fn cycle_survives_removals() {
        let mut cache: Cache = CacheCore::new(4);
        for i in 0..4 {
            cache.insert(i, "x");
        }
        cache.invalidate(&1);
        cache.invalidate(&3);
        cache.debug_validate_invariants();
        cache.insert(9, "y");
        cache.debug_validate_invariants();
        assert_eq!(cache.len(), 3);
    }
}
