//! Clock (second-chance) replacement policy.
//!
//! A circular doubly-linked list threaded through the arena slot metas,
//! with a hand pointer marking the next eviction candidate. Accesses
//! set a reference bit instead of reordering the list; the victim sweep
//! clears bits as it passes, so any entry accessed since its bit was
//! last cleared survives at least one hand pass.
//!
//! ```text
//!          hand
//!           ▼
//!   ... ─► [A ref=1] ─► [B ref=0] ─► [C ref=1] ─► ... (circular)
//!
//!   sweep: A has the bit → clear, advance
//!          B is clean    → victim, hand moves past it
//! ```
//!
//! New entries are linked immediately behind the hand (the cycle tail)
//! with their bit set. The sweep visits at most two full revolutions:
//! the first may only clear bits, the second then finds a victim unless
//! every entry fails the eviction predicate.

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// CLOCK per-entry fields: cycle neighbours and the reference bit.
#[derive(Debug, Default)]
pub struct ClockMeta {
    prev: Option<SlotId>,
    next: Option<SlotId>,
    referenced: bool,
}

/// CLOCK policy state: the sweep hand.
#[derive(Debug)]
pub struct ClockPolicy {
    hand: Option<SlotId>,
}

impl ClockPolicy {
    /// Links `id` into the cycle immediately before the hand.
    fn link_before_hand<K, V>(&mut self, arena: &mut SlotArena<K, V, ClockMeta>, id: SlotId) {
        let hand = match self.hand {
            Some(h) => h,
            None => {
                // first entry forms a self-cycle
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

    /// Unlinks `id` from the cycle, moving the hand off it if needed.
    fn unlink<K, V>(&mut self, arena: &mut SlotArena<K, V, ClockMeta>, id: SlotId) {
        let (prev, next) = match arena.get(id) {
            Some(slot) => (slot.meta.prev, slot.meta.next),
            None => return,
        };
        if next == Some(id) {
            // last entry in the cycle
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
            slot.meta.referenced = false;
        }
    }
}

impl<K, V> EvictionPolicy<K, V> for ClockPolicy {
    type Meta = ClockMeta;

    fn new(_capacity: usize) -> Self {
        Self { hand: None }
    }

    fn name(&self) -> &'static str {
        "CLOCK"
    }

    fn on_access(&mut self, arena: &mut SlotArena<K, V, ClockMeta>, id: SlotId) {
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.referenced = true;
        }
    }

    fn on_insert(&mut self, arena: &mut SlotArena<K, V, ClockMeta>, id: SlotId) {
        self.link_before_hand(arena, id);
        if let Some(slot) = arena.get_mut(id) {
            slot.meta.referenced = true;
        }
    }

    fn on_remove(&mut self, arena: &mut SlotArena<K, V, ClockMeta>, id: SlotId) {
        self.unlink(arena, id);
    }

    fn pick_victim<F>(&mut self, arena: &mut SlotArena<K, V, ClockMeta>, evictable: F) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, ClockMeta>) -> bool,
    {
        let mut hand = self.hand?;
        // two full revolutions: the first may only clear bits
        let steps = arena.len().saturating_mul(2);
        for _ in 0..steps {
            let (next, candidate, referenced) = {
                let slot = arena.get(hand)?;
                (slot.meta.next, evictable(slot), slot.meta.referenced)
            };
            let next = next.unwrap_or(hand);
            if candidate {
                if !referenced {
                    self.hand = Some(next);
                    return Some(hand);
                }
                if let Some(slot) = arena.get_mut(hand) {
                    slot.meta.referenced = false;
                }
            }
            // un-evictable entries are passed without touching the bit
            hand = next;
            self.hand = Some(hand);
        }
        None
    }

    fn reset(&mut self) {
        self.hand = None;
    }

    fn debug_validate(&self, arena: &SlotArena<K, V, ClockMeta>) {
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
