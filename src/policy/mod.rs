//! Eviction policies.
//!
//! Every policy implements the same four-hook shape over the shared
//! [`SlotArena`]: `on_access`, `on_insert`, `on_remove` (plus the
//! eviction-specific `on_evict`), and a `pick_victim` scan. Hooks are
//! O(1); `pick_victim` may scan but is bounded at two full traversals
//! of the policy's tracked set. Each policy owns its per-entry
//! extension fields (the arena's `meta` parameter) and its own state
//! block, and is written as single-threaded code: the cache manager
//! serialises every call under its mutex.

pub mod arc;
pub mod clock;
pub mod fifo;
pub mod lfu;
pub mod lru;
pub mod sieve;

pub use arc::ArcPolicy;
pub use clock::ClockPolicy;
pub use fifo::FifoPolicy;
pub use lfu::LfuPolicy;
pub use lru::LruPolicy;
pub use sieve::SievePolicy;

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};

/// Replacement policy plugged into a cache manager.
///
/// The manager validates entries before invoking hooks, so hooks are
/// infallible. `pick_victim` receives the eviction predicate (valid,
/// unpinned, clean) and must return `None` only after its full
/// traversal found no entry satisfying it.
pub trait EvictionPolicy<K, V>: Sized {
    /// Per-entry fields threaded through the arena slots.
    type Meta: Default + std::fmt::Debug;

    /// Creates the policy state for a cache of `capacity` entries.
    fn new(capacity: usize) -> Self;

    /// Tag for diagnostics.
    fn name(&self) -> &'static str;

    /// Called on every hit and on duplicate inserts.
    fn on_access(&mut self, arena: &mut SlotArena<K, V, Self::Meta>, id: SlotId);

    /// Called when a new entry joins the cache.
    fn on_insert(&mut self, arena: &mut SlotArena<K, V, Self::Meta>, id: SlotId);

    /// Called when an entry leaves by invalidation or clear.
    fn on_remove(&mut self, arena: &mut SlotArena<K, V, Self::Meta>, id: SlotId);

    /// Called when an entry leaves by eviction. Defaults to
    /// [`on_remove`](Self::on_remove); ARC overrides it to record the
    /// departing key in its ghost lists.
    fn on_evict(&mut self, arena: &mut SlotArena<K, V, Self::Meta>, id: SlotId) {
        self.on_remove(arena, id);
    }

    /// Returns the preferred evictable entry, or `None` if no tracked
    /// entry satisfies the predicate. May mutate policy bits (CLOCK and
    /// SIEVE clear reference bits while sweeping).
    fn pick_victim<F>(
        &mut self,
        arena: &mut SlotArena<K, V, Self::Meta>,
        evictable: F,
    ) -> Option<SlotId>
    where
        F: Fn(&Slot<K, V, Self::Meta>) -> bool;

    /// Returns the policy state to its initial (empty) configuration.
    fn reset(&mut self);

    /// Validates policy invariants against the arena. Debug/test aid;
    /// the default does nothing.
    fn debug_validate(&self, _arena: &SlotArena<K, V, Self::Meta>) {}
}
