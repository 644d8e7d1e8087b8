//! Cache manager: the public operation surface over arena + policy.
//!
//! [`CacheCore`] is the single-threaded engine: it owns the slot arena,
//! the key index, the policy state, and the statistics counters, and
//! implements the full operation contract (lookup/insert/invalidate,
//! pinning, dirty tracking, resize, clear, stats). [`CacheManager`]
//! wraps a core in one `parking_lot::Mutex` and exposes the same
//! surface on `&self`; every public operation holds the mutex for its
//! entire body, so policy hooks and victim scans never race.
//!
//! ## Insert/eviction protocol
//!
//! Inserting an absent key into a full cache asks the policy for a
//! victim under the eviction predicate (valid, unpinned, clean). If the
//! policy's full traversal finds none, the insert is refused and the
//! cache is left unchanged. Otherwise the victim leaves through
//! `on_evict`, its slot is recycled for the new entry, and the entry
//! enters through `on_insert`.
//!
//! # Example
//!
//! ```
//! use sectorcache::manager::CacheManager;
//! use sectorcache::policy::lru::LruPolicy;
//!
//! let cache: CacheManager<u64, &str, LruPolicy> = CacheManager::new(2);
//! assert!(cache.insert(1, "a"));
//! assert!(cache.insert(2, "b"));
//! assert_eq!(cache.lookup(&1), Some("a"));
//!
//! assert!(cache.insert(3, "c")); // evicts 2, the least recently used
//! assert_eq!(cache.lookup(&2), None);
//! assert_eq!(cache.stats().evictions, 1);
//! ```

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::hash::Hash;

use crate::ds::slot_arena::{Slot, SlotArena, SlotId};
use crate::policy::EvictionPolicy;

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub used_entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hits over completed lookups; zero when no lookup has happened.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Detailed result of [`CacheCore::insert_full`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<K, V> {
    /// The entry was inserted, displacing `evicted` if the cache was
    /// full.
    Inserted { evicted: Option<(K, V)> },
    /// The key was already resident; the stored value is unchanged and
    /// the access hook has run.
    AlreadyPresent,
    /// The cache is full and no entry satisfies the eviction predicate.
    CapacityExhausted,
}

/// Single-threaded cache engine. Wrap in [`CacheManager`] for shared
/// use.
#[derive(Debug)]
pub struct CacheCore<K, V, P: EvictionPolicy<K, V>> {
    arena: SlotArena<K, V, P::Meta>,
    index: FxHashMap<K, SlotId>,
    policy: P,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V, P> CacheCore<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: EvictionPolicy<K, V>,
{
    /// Creates a cache of fixed `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: SlotArena::new(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            policy: P::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Number of resident entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns `true` if no entry is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Current logical capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Diagnostic tag of the bound policy.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Read access to the policy state (diagnostics).
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Returns `true` if `key` is resident, without touching policy
    /// state or statistics.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Looks up `key`, recording a hit or miss and firing the policy
    /// access hook on a hit.
    pub fn lookup(&mut self, key: &K) -> Option<V> {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => {
                self.misses += 1;
                return None;
            },
        };
        self.policy.on_access(&mut self.arena, id);
        self.hits += 1;
        self.arena.get(id).map(|slot| slot.value.clone())
    }

    /// Returns the value for `key` without policy hooks or statistics.
    pub fn peek(&self, key: &K) -> Option<V> {
        let id = *self.index.get(key)?;
        self.arena.get(id).map(|slot| slot.value.clone())
    }

    /// [`lookup`](Self::lookup) that also raises the pin count on a
    /// hit, in one atomic step. Callers dispatching I/O against the
    /// returned value unpin once the dispatch completes, so eviction
    /// can never race the dispatch.
    pub fn lookup_pin(&mut self, key: &K) -> Option<V> {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => {
                self.misses += 1;
                return None;
            },
        };
        self.policy.on_access(&mut self.arena, id);
        self.hits += 1;
        self.arena.get_mut(id).map(|slot| {
            slot.pin_count += 1;
            slot.value.clone()
        })
    }

    /// Inserts `key → value`. Returns `true` if newly inserted (possibly
    /// after an eviction); `false` if the key was already present (the
    /// stored value is left unchanged and the access hook runs) or if
    /// the cache is full with nothing evictable.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        matches!(self.insert_full(key, value), InsertOutcome::Inserted { .. })
    }

    /// Like [`insert`](Self::insert) but reports what happened,
    /// including the evicted entry so callers can recycle resources
    /// tied to the displaced value.
    pub fn insert_full(&mut self, key: K, value: V) -> InsertOutcome<K, V> {
        if let Some(&id) = self.index.get(&key) {
            self.policy.on_access(&mut self.arena, id);
            return InsertOutcome::AlreadyPresent;
        }
        if self.capacity() == 0 {
            return InsertOutcome::CapacityExhausted;
        }
        let mut evicted = None;
        while self.arena.is_full() {
            match self.evict_one() {
                Some(pair) => evicted = Some(pair),
                None => return InsertOutcome::CapacityExhausted,
            }
        }
        let id = match self.arena.alloc(key.clone(), value) {
            Some(id) => id,
            None => return InsertOutcome::CapacityExhausted,
        };
        self.index.insert(key, id);
        self.policy.on_insert(&mut self.arena, id);
        InsertOutcome::Inserted { evicted }
    }

    /// Evicts the policy-preferred entry satisfying the eviction
    /// predicate, returning it. `None` if nothing is evictable.
    pub fn evict_one(&mut self) -> Option<(K, V)> {
        let victim = self.policy.pick_victim(&mut self.arena, Slot::evictable)?;
        self.policy.on_evict(&mut self.arena, victim);
        let slot = self.arena.release(victim)?;
        self.index.remove(&slot.key);
        self.evictions += 1;
        Some((slot.key, slot.value))
    }

    /// Removes `key` if resident, returning its value. Absent keys are
    /// a silent no-op.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let id = self.index.remove(key)?;
        self.policy.on_remove(&mut self.arena, id);
        self.arena.release(id).map(|slot| slot.value)
    }

    /// Raises the pin count of `key`; pinned entries are never evicted.
    /// Returns `false` if the key is absent.
    pub fn pin(&mut self, key: &K) -> bool {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => return false,
        };
        match self.arena.get_mut(id) {
            Some(slot) => {
                slot.pin_count += 1;
                true
            },
            None => false,
        }
    }

    /// Lowers the pin count of `key`. Unpinning at zero or an absent
    /// key is a silent no-op (never underflows).
    pub fn unpin(&mut self, key: &K) -> bool {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => return false,
        };
        match self.arena.get_mut(id) {
            Some(slot) => {
                slot.pin_count = slot.pin_count.saturating_sub(1);
                true
            },
            None => false,
        }
    }

    /// Sets the dirty bit of `key`; dirty entries are never evicted.
    /// Idempotent; `false` if the key is absent.
    pub fn mark_dirty(&mut self, key: &K) -> bool {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => return false,
        };
        match self.arena.get_mut(id) {
            Some(slot) => {
                slot.dirty = true;
                true
            },
            None => false,
        }
    }

    /// Clears the dirty bit of `key`; `false` if the key is absent.
    pub fn mark_clean(&mut self, key: &K) -> bool {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => return false,
        };
        match self.arena.get_mut(id) {
            Some(slot) => {
                slot.dirty = false;
                true
            },
            None => false,
        }
    }

    /// Up to `max` keys currently marked dirty; iteration order is
    /// unspecified.
    pub fn get_dirty(&self, max: usize) -> Vec<K> {
        self.arena
            .iter()
            .filter(|slot| slot.dirty)
            .take(max)
            .map(|slot| slot.key.clone())
            .collect()
    }

    /// Changes the capacity. Growing appends free slots; shrinking
    /// evicts until `used ≤ new_capacity`, stopping early if nothing is
    /// evictable (the logical capacity still drops, and inserts fail
    /// until enough entries are released).
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity >= self.capacity() {
            self.arena.grow(new_capacity);
            return;
        }
        while self.arena.len() > new_capacity {
            if self.evict_one().is_none() {
                break;
            }
        }
        self.arena.shrink(new_capacity);
    }

    /// Returns to the empty initial state; statistics are zeroed.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
        self.policy.reset();
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            used_entries: self.arena.len(),
            capacity: self.arena.capacity(),
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.arena.debug_validate_invariants();
        assert_eq!(
            self.index.len(),
            self.arena.len(),
            "key index must cover exactly the valid slots"
        );
        for (key, &id) in &self.index {
            let slot = self.arena.get(id).expect("index points at invalid slot");
            assert!(&slot.key == key, "index key does not match slot key");
        }
        self.policy.debug_validate(&self.arena);
    }
}

/// Thread-safe cache manager: a [`CacheCore`] behind one mutex.
///
/// Every operation acquires the mutex for its entire body, which makes
/// the per-key operation order total and lets the policies stay
/// single-threaded code.
#[derive(Debug)]
pub struct CacheManager<K, V, P: EvictionPolicy<K, V>> {
    inner: Mutex<CacheCore<K, V, P>>,
}

impl<K, V, P> CacheManager<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: EvictionPolicy<K, V>,
{
    /// Creates a manager with a fixed-capacity core.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheCore::new(capacity)),
        }
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.inner.lock().lookup(key)
    }

    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().peek(key)
    }

    pub fn lookup_pin(&self, key: &K) -> Option<V> {
        self.inner.lock().lookup_pin(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn insert(&self, key: K, value: V) -> bool {
        self.inner.lock().insert(key, value)
    }

    pub fn insert_full(&self, key: K, value: V) -> InsertOutcome<K, V> {
        self.inner.lock().insert_full(key, value)
    }

    pub fn evict_one(&self) -> Option<(K, V)> {
        self.inner.lock().evict_one()
    }

    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.inner.lock().invalidate(key)
    }

    pub fn pin(&self, key: &K) -> bool {
        self.inner.lock().pin(key)
    }

    pub fn unpin(&self, key: &K) -> bool {
        self.inner.lock().unpin(key)
    }

    pub fn mark_dirty(&self, key: &K) -> bool {
        self.inner.lock().mark_dirty(key)
    }

    pub fn mark_clean(&self, key: &K) -> bool {
        self.inner.lock().mark_clean(key)
    }

    pub fn get_dirty(&self, max: usize) -> Vec<K> {
        self.inner.lock().get_dirty(max)
    }

    pub fn resize(&self, new_capacity: usize) {
        self.inner.lock().resize(new_capacity)
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.lock().policy_name()
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.inner.lock().debug_validate_invariants()
    }
}
