//! Least Frequently Used replacement policy.
//!
//! Entries are grouped into frequency buckets, each a doubly-linked
//! list threaded through the arena slot metas. A `min_freq` tracker
//! names the smallest populated bucket so the common victim scan starts
//! in O(1).
//!
//! ## Architecture
//!
//! ```text
//!   buckets: FxHashMap<u64, Bucket { head, tail }>
//!
//!   freq 1:  head ─► [C] ◄──► [D] ◄─ tail      (head = oldest in bucket)
//!   freq 2:  head ─► [A] ◄─ tail
//!   freq 5:  head ─► [B] ◄─ tail
//!   min_freq = 1
//!
//!   on_access(C): unlink from bucket 1, append at tail of bucket 2
//!   pick_victim:  walk bucket 1 head→tail, then bucket 2, then 5;
//!                 first entry satisfying the predicate wins
//! ```
//!
//! When a bucket empties and it was the minimum, `min_freq` advances to
//! the next populated bucket (never a blind increment). The victim scan
//! continues into higher buckets when every entry of the minimum bucket
//! is pinned or dirty, so eviction preference stays frequency-ordered
//! while still covering the full tracked set.

use rustc_hash::FxHashMap;

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// LFU per-entry fields: access count and bucket neighbours.
#[derive(Debug, Default)]
pub struct LfuMeta {
    freq: u64,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

/// LFU policy state: frequency buckets and the minimum-frequency tracker.
#[derive(Debug)]
pub struct LfuPolicy {
    buckets: FxHashMap<u64, Bucket>,
    /// Smallest populated frequency; 0 while the cache is empty.
    min_freq: u64,
}

impl LfuPolicy {
    /// Appends `id` at the tail of `freq`'s bucket (newest position).
    fn push_tail<K, V>(&mut self, arena: &mut SlotArena<K, V, LfuMeta>, freq: u64, id: SlotId) {
        let bucket = self.buckets.entry(freq).or_default();
        let old_tail = bucket.tail;
        bucket.tail = Some(id);
        if bucket.head.is_none() {
            bucket.head = Some(id);
        }
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.freq = freq;
            slot.meta.prev = old_tail;
            slot.meta.next = None;
        }
        if let Some(t) = old_tail {
            if let Some(slot) = arena.get_mut(t) {
                slot.meta.next = Some(id);
            }
        }
    }

    /// Unlinks `id` from its bucket; returns `true` if the bucket
    /// emptied and was removed.
    fn unlink<K, V>(&mut self, arena: &mut SlotArena<K, V, LfuMeta>, id: SlotId) -> bool {
        let (freq, prev, next) = match arena.get(id) {
            Some(slot) => (slot.meta.freq, slot.meta.prev, slot.meta.next),
            None => return false,
        };
        match prev {
            Some(p) => {
                if let Some(slot) = arena.get_mut(p) {
                    slot.meta.next = next;
                }
            },
            None => {
                if let Some(bucket) = self.buckets.get_mut(&freq) {
                    bucket.head = next;
                }
            },
        }
        match next {
            Some(n) => {
                if let Some(slot) = arena.get_mut(n) {
                    slot.meta.prev = prev;
                }
            },
            None => {
                if let Some(bucket) = self.buckets.get_mut(&freq) {
                    bucket.tail = prev;
                }
            },
        }
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.prev = None;
            slot.meta.next = None;
        }
        if self.buckets.get(&freq).is_some_and(|b| b.head.is_none()) {
            self.buckets.remove(&freq);
            return true;
        }
        false
    }

    /// Re-derives `min_freq` as the smallest populated bucket.
    fn advance_min_freq(&mut self) {
        self.min_freq = self.buckets.keys().copied().min().unwrap_or(0);
    }
}

impl<K, V> EvictionPolicy<K, V> for LfuPolicy {
    type Meta = LfuMeta;

    fn new(capacity: usize) -> Self {
        Self {
            buckets: FxHashMap::with_capacity_and_hasher(capacity.min(64), Default::default()),
            min_freq: 0,
        }
    }

    fn name(&self) -> &'static str {
        "LFU"
    }

    fn on_access(&mut self, arena: &mut SlotArena<K, V, LfuMeta>, id: SlotId) {
        let freq = match arena.get(id) {
            Some(slot) => slot.meta.freq,
            None => return,
        };
        let emptied = self.unlink(arena, id);
        let next_freq = freq.saturating_add(1);
        self.push_tail(arena, next_freq, id);
        if emptied && self.min_freq == freq {
            // the entry itself populated the next bucket
            self.min_freq = next_freq;
        }
    }

    fn on_insert(&mut self, arena: &mut SlotArena<K, V, LfuMeta>, id: SlotId) {
        self.push_tail(arena, 1, id);
        self.min_freq = 1;
    }

    fn on_remove(&mut self, arena: &mut SlotArena<K, V, LfuMeta>, id: SlotId) {
        let freq = match arena.get(id) {
            Some(slot) => slot.meta.freq,
            None => return,
        };
        let emptied = self.unlink(arena, id);
        if emptied && self.min_freq == freq {
            self.advance_min_freq();
        }
    }

    fn pick_victim<F>(&mut self, arena: &mut SlotArena<K, V, LfuMeta>, evictable: F) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, LfuMeta>) -> bool,
    {
        let mut freqs: Vec<u64> = self.buckets.keys().copied().collect();
        freqs.sort_unstable();
        for freq in freqs {
            let mut current = self.buckets.get(&freq).and_then(|b| b.head);
            while let Some(id) = current {
                let slot = arena.get(id)?;
                if evictable(slot) {
                    return Some(id);
                }
                current = slot.meta.next;
            }
        }
        None
    }

    fn reset(&mut self) {
        self.buckets.clear();
        self.min_freq = 0;
    }

    fn debug_validate(&self, arena: &SlotArena<K, V, LfuMeta>) {
        let mut total = 0usize;
        for (&freq, bucket) in &self.buckets {
            assert!(bucket.head.is_some(), "populated bucket must be non-empty");
            let mut prev = None;
            let mut current = bucket.head;
            while let Some(id) = current {
                let slot = arena.get(id).expect("bucket id points at invalid slot");
                assert_eq!(slot.meta.freq, freq, "entry freq must match its bucket");
                assert_eq!(slot.meta.prev, prev, "prev link broken");
                prev = Some(id);
                current = slot.meta.next;
                total += 1;
                assert!(total <= arena.len(), "cycle in bucket list");
            }
            assert_eq!(prev, bucket.tail, "bucket tail broken");
        }
        assert_eq!(total, arena.len(), "buckets must contain exactly the valid slots");
        let expected_min = self.buckets.keys().copied().min().unwrap_or(0);
        assert_eq!(self.min_freq, expected_min, "min_freq must name the smallest bucket");
    }
}
