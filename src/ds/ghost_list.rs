//! Bounded recency list for ghost entries.
//!
//! Tracks recently evicted keys (no values) for ARC's B1/B2 lists.
//! Implemented as an [`IntrusiveList`] plus an `FxHashMap` index so
//! membership checks are O(1). When a record pushes the list past its
//! capacity, the oldest key is dropped.
//!
//! ```text
//!   index: FxHashMap<K, NodeId>      list: head ─► [A] ◄──► [B] ◄──► [C]
//!                                               MRU                LRU
//!   record(D) at capacity 3: drop C, push D at head
//!   record(B): move B to head
//! ```

use rustc_hash::FxHashMap;
use std::hash::Hash;

use crate::ds::intrusive_list::{IntrusiveList, NodeId};

/// Bounded recency list of keys, newest first.
///
/// # Example
///
/// ```
/// use sectorcache::ds::GhostList;
///
/// let mut ghost = GhostList::new(2);
/// ghost.record("a");
/// ghost.record("b");
/// ghost.record("c"); // "a" falls off the LRU end
/// assert!(!ghost.contains(&"a"));
/// assert!(ghost.contains(&"b"));
/// assert!(ghost.contains(&"c"));
/// ```
#[derive(Debug)]
pub struct GhostList<K> {
    list: IntrusiveList<K>,
    index: FxHashMap<K, NodeId>,
    capacity: usize,
}

impl<K> GhostList<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost list holding at most `capacity` keys. Capacity 0
    /// produces a no-op list that ignores all records.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: IntrusiveList::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
        }
    }

    /// Configured capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys currently tracked.
    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` if no key is tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns `true` if `key` is tracked.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Records `key` at the MRU position, promoting it if already
    /// tracked and dropping the LRU key if the list is full.
    pub fn record(&mut self, key: K) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&id) = self.index.get(&key) {
            self.list.move_to_front(id);
            return;
        }
        if self.list.len() == self.capacity {
            if let Some(oldest) = self.list.pop_back() {
                self.index.remove(&oldest);
            }
        }
        let id = self.list.push_front(key.clone());
        self.index.insert(key, id);
    }

    /// Stops tracking `key`; returns `true` if it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(id) => {
                self.list.remove(id);
                true
            },
            None => false,
        }
    }

    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!(self.list.len() <= self.capacity, "ghost list over capacity");
        assert_eq!(self.list.len(), self.index.len());
        for (key, &id) in &self.index {
            assert!(self.list.get(id) == Some(key), "index points at wrong node");
        }
        self.list.debug_validate_invariants();
    }
}
