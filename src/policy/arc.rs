//! Adaptive Replacement Cache (ARC) policy.
//!
//! Balances recency against frequency with four sets and a self-tuning
//! target:
//!
//! ```text
//!   T1 (resident, seen once)        T2 (resident, seen 2+ times)
//!   head=MRU ◄──────► tail=LRU      head=MRU ◄──────► tail=LRU
//!        │ evict                         │ evict
//!        ▼                               ▼
//!   B1 (ghost keys from T1)         B2 (ghost keys from T2)
//!
//!   p = target size of T1, adapted on ghost hits:
//!     miss found in B1 → p grows  (recency was undervalued)
//!     miss found in B2 → p shrinks (frequency was undervalued)
//! ```
//!
//! Hits promote the entry to the head of T2. A re-inserted key found in
//! a ghost list goes straight to T2 and moves `p` by
//! `max(1, |other ghost| / |hit ghost|)`, clamped to `[0, capacity]`.
//! Victim selection prefers the T1 tail while `|T1| ≥ p` and the T2
//! tail otherwise, walking toward the head under the eviction predicate
//! and falling back to the other list; the evicted key is recorded in
//! the ghost list of the side it left. Ghost lists are bounded at
//! `capacity` keys each with O(1) membership. `p` starts at 0.
//!
//! Reference: Megiddo & Modha, "ARC: A Self-Tuning, Low Overhead
//! Replacement Cache", FAST 2003.

use std::hash::Hash;

use crate::ds::ghost_list::GhostList;
use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// ARC per-entry fields: list neighbours and T1/T2 membership.
#[derive(Debug, Default)]
pub struct ArcMeta {
    prev: Option<SlotId>,
    next: Option<SlotId>,
    in_t1: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct ListAnchor {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

/// ARC policy state: resident anchors, ghost lists, and the target `p`.
#[derive(Debug)]
pub struct ArcPolicy<K> {
    t1: ListAnchor,
    t2: ListAnchor,
    b1: GhostList<K>,
    b2: GhostList<K>,
    /// Target size of T1, in `[0, capacity]`.
    p: usize,
    capacity: usize,
}

impl<K> ArcPolicy<K>
where
    K: Eq + Hash + Clone,
{
    /// Current value of the adaptation target.
    pub fn p_value(&self) -> usize {
        self.p
    }

    /// Number of resident entries seen once.
    pub fn t1_len(&self) -> usize {
        self.t1.len
    }

    /// Number of resident entries seen at least twice.
    pub fn t2_len(&self) -> usize {
        self.t2.len
    }

    /// Number of ghost keys recently evicted from T1.
    pub fn b1_len(&self) -> usize {
        self.b1.len()
    }

    /// Number of ghost keys recently evicted from T2.
    pub fn b2_len(&self) -> usize {
        self.b2.len()
    }

    fn detach<V>(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, id: SlotId) {
        let (prev, next, in_t1) = match arena.get(id) {
            Some(slot) => (slot.meta.prev, slot.meta.next, slot.meta.in_t1),
            None => return,
        };
        let anchor = if in_t1 { &mut self.t1 } else { &mut self.t2 };
        match prev {
            Some(_) => {},
            None => anchor.head = next,
        }
        match next {
            Some(_) => {},
            None => anchor.tail = prev,
        }
        anchor.len -= 1;
        if let Some(p) = prev {
            if let Some(slot) = arena.get_mut(p) {
                slot.meta.next = next;
            }
        }
        if let Some(n) = next {
            if let Some(slot) = arena.get_mut(n) {
                slot.meta.prev = prev;
            }
        }
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = None;
            slot.meta.next = None;
        }
    }

    fn attach_head<V>(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, id: SlotId, to_t1: bool) {
        let anchor = if to_t1 { &mut self.t1 } else { &mut self.t2 };
        let old_head = anchor.head;
        anchor.head = Some(id);
        if anchor.tail.is_none() {
            anchor.tail = Some(id);
        }
        anchor.len += 1;
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = None;
            slot.meta.next = old_head;
            slot.meta.in_t1 = to_t1;
        }
        if let Some(h) = old_head {
            if let Some(slot) = arena.get_mut(h) {
                slot.meta.prev = Some(id);
            }
        }
    }

    fn scan_tail<V, F>(
        &self,
        arena: &SlotArena<K, V, ArcMeta>,
        anchor: ListAnchor,
        evictable: &F,
    ) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, ArcMeta>) -> bool,
    {
        let mut current = anchor.tail;
        while let Some(id) = current {
            let slot = arena.get(id)?;
            if evictable(slot) {
                return Some(id);
            }
            current = slot.meta.prev;
        }
        None
    }
}

impl<K, V> EvictionPolicy<K, V> for ArcPolicy<K>
where
    K: Eq + Hash + Clone,
{
    type Meta = ArcMeta;

    fn new(capacity: usize) -> Self {
        Self {
            t1: ListAnchor::default(),
            t2: ListAnchor::default(),
            b1: GhostList::new(capacity),
            b2: GhostList::new(capacity),
            p: 0,
            capacity,
        }
    }

    fn name(&self) -> &'static str {
        "ARC"
    }

    fn on_access(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, id: SlotId) {
        // any hit is proof of reuse: promote to the T2 MRU position
        self.detach(arena, id);
        self.attach_head(arena, id, false);
    }

    fn on_insert(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, id: SlotId) {
        let key = match arena.get(id) {
            Some(slot) => slot.key.clone(),
            None => return,
        };
        if self.b1.contains(&key) {
            let delta = (self.b2.len() / self.b1.len().max(1)).max(1);
            self.p = (self.p + delta).min(self.capacity);
            self.b1.remove(&key);
            self.attach_head(arena, id, false);
        } else if self.b2.contains(&key) {
            let delta = (self.b1.len() / self.b2.len().max(1)).max(1);
            self.p = self.p.saturating_sub(delta);
            self.b2.remove(&key);
            self.attach_head(arena, id, false);
        } else {
            self.attach_head(arena, id, true);
        }
    }

    fn on_remove(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, id: SlotId) {
        self.detach(arena, id);
    }

    fn on_evict(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, id: SlotId) {
        let departing = arena
            .get(id)
            .map(|slot| (slot.key.clone(), slot.meta.in_t1));
        self.detach(arena, id);
        if let Some((key, was_t1)) = departing {
            if was_t1 {
                self.b1.record(key);
            } else {
                self.b2.record(key);
            }
        }
    }

    fn pick_victim<F>(&mut self, arena: &mut SlotArena<K, V, ArcMeta>, evictable: F) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, ArcMeta>) -> bool,
    {
        let prefer_t1 = self.t1.len > 0 && self.t1.len >= self.p;
        let (first, second) = if prefer_t1 {
            (self.t1, self.t2)
        } else {
            (self.t2, self.t1)
        };
        self.scan_tail(arena, first, &evictable)
            .or_else(|| self.scan_tail(arena, second, &evictable))
    }

    fn reset(&mut self) {
        self.t1 = ListAnchor::default();
        self.t2 = ListAnchor::default();
        self.b1.clear();
        self.b2.clear();
        self.p = 0;
    }

    fn debug_validate(&self, arena: &SlotArena<K, V, ArcMeta>) {
        assert!(self.p <= self.capacity, "p out of range");
        assert_eq!(
            self.t1.len + self.t2.len,
            arena.len(),
            "resident lists must cover the valid slots"
        );
        assert!(self.b1.len() <= self.capacity, "B1 over capacity");
        assert!(self.b2.len() <= self.capacity, "B2 over capacity");
        self.b1.debug_validate_invariants();
        self.b2.debug_validate_invariants();

        for (anchor, expect_t1) in [(self.t1, true), (self.t2, false)] {
            let mut count = 0usize;
            let mut prev = None;
            let mut current = anchor.head;
            while let Some(id) = current {
                let slot = arena.get(id).expect("list id points at invalid slot");
                assert_eq!(slot.meta.in_t1, expect_t1, "entry on the wrong list");
                assert_eq!(slot.meta.prev, prev, "prev link broken");
                // ghosts and residents must be disjoint
                assert!(!self.b1.contains(&slot.key), "resident key in B1");
                assert!(!self.b2.contains(&slot.key), "resident key in B2");
                prev = Some(id);
                current = slot.meta.next;
                count += 1;
                assert!(count <= arena.len(), "cycle in resident list");
            }
            assert_eq!(prev, anchor.tail, "tail anchor broken");
            assert_eq!(count, anchor.len, "anchor len mismatch");
        }
    }
}
