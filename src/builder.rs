//! Unified cache builder for all eviction policies.
//!
//! Provides runtime policy selection behind a single type while the
//! managers themselves stay statically generic. Each [`Cache`] variant
//! wraps a mutex-guarded [`CacheManager`], so the built cache is safe
//! to share across threads.
//!
//! ## Example
//!
//! ```
//! use sectorcache::builder::{CacheBuilder, PolicyKind};
//!
//! let cache = CacheBuilder::new(100)
//!     .policy(PolicyKind::Lfu)
//!     .build::<u64, String>();
//! cache.insert(1, "hello".to_string());
//! assert_eq!(cache.lookup(&1), Some("hello".to_string()));
//! assert_eq!(cache.policy_name(), "LFU");
//! ```

use std::hash::Hash;
use std::str::FromStr;

use crate::error::Error;
use crate::manager::{CacheManager, CacheStats};
use crate::policy::{ArcPolicy, ClockPolicy, FifoPolicy, LfuPolicy, LruPolicy, SievePolicy};

/// Available eviction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Lru,
    Fifo,
    Lfu,
    Clock,
    Sieve,
    Arc,
}

impl PolicyKind {
    /// Diagnostic tag matching the policy's `name()`.
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Lru => "LRU",
            PolicyKind::Fifo => "FIFO",
            PolicyKind::Lfu => "LFU",
            PolicyKind::Clock => "CLOCK",
            PolicyKind::Sieve => "SIEVE",
            PolicyKind::Arc => "ARC",
        }
    }
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Error> {
        match raw.to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "fifo" => Ok(PolicyKind::Fifo),
            "lfu" => Ok(PolicyKind::Lfu),
            "clock" => Ok(PolicyKind::Clock),
            "sieve" => Ok(PolicyKind::Sieve),
            "arc" => Ok(PolicyKind::Arc),
            other => Err(Error::Config(format!("unknown eviction policy {other:?}"))),
        }
    }
}

/// Policy-erased, thread-safe cache.
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    inner: CacheInner<K, V>,
}

enum CacheInner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    Lru(CacheManager<K, V, LruPolicy>),
    Fifo(CacheManager<K, V, FifoPolicy>),
    Lfu(CacheManager<K, V, LfuPolicy>),
    Clock(CacheManager<K, V, ClockPolicy>),
    Sieve(CacheManager<K, V, SievePolicy>),
    Arc(CacheManager<K, V, ArcPolicy<K>>),
}

macro_rules! dispatch {
    ($self:ident, $manager:ident => $body:expr) => {
        match &$self.inner {
            CacheInner::Lru($manager) => $body,
            CacheInner::Fifo($manager) => $body,
            CacheInner::Lfu($manager) => $body,
            CacheInner::Clock($manager) => $body,
            CacheInner::Sieve($manager) => $body,
            CacheInner::Arc($manager) => $body,
        }
    };
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache of `capacity` entries using `kind` for eviction.
    pub fn new(capacity: usize, kind: PolicyKind) -> Self {
        let inner = match kind {
            PolicyKind::Lru => CacheInner::Lru(CacheManager::new(capacity)),
            PolicyKind::Fifo => CacheInner::Fifo(CacheManager::new(capacity)),
            PolicyKind::Lfu => CacheInner::Lfu(CacheManager::new(capacity)),
            PolicyKind::Clock => CacheInner::Clock(CacheManager::new(capacity)),
            PolicyKind::Sieve => CacheInner::Sieve(CacheManager::new(capacity)),
            PolicyKind::Arc => CacheInner::Arc(CacheManager::new(capacity)),
        };
        Self { inner }
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        dispatch!(self, manager => manager.lookup(key))
    }

    pub fn peek(&self, key: &K) -> Option<V> {
        dispatch!(self, manager => manager.peek(key))
    }

    pub fn contains(&self, key: &K) -> bool {
        dispatch!(self, manager => manager.contains(key))
    }

    pub fn insert(&self, key: K, value: V) -> bool {
        dispatch!(self, manager => manager.insert(key, value))
    }

    pub fn invalidate(&self, key: &K) -> Option<V> {
        dispatch!(self, manager => manager.invalidate(key))
    }

    pub fn pin(&self, key: &K) -> bool {
        dispatch!(self, manager => manager.pin(key))
    }

    pub fn unpin(&self, key: &K) -> bool {
        dispatch!(self, manager => manager.unpin(key))
    }

    pub fn mark_dirty(&self, key: &K) -> bool {
        dispatch!(self, manager => manager.mark_dirty(key))
    }

    pub fn mark_clean(&self, key: &K) -> bool {
        dispatch!(self, manager => manager.mark_clean(key))
    }

    pub fn get_dirty(&self, max: usize) -> Vec<K> {
        dispatch!(self, manager => manager.get_dirty(max))
    }

    pub fn resize(&self, new_capacity: usize) {
        dispatch!(self, manager => manager.resize(new_capacity))
    }

    pub fn clear(&self) {
        dispatch!(self, manager => manager.clear())
    }

    pub fn stats(&self) -> CacheStats {
        dispatch!(self, manager => manager.stats())
    }

    pub fn len(&self) -> usize {
        dispatch!(self, manager => manager.len())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, manager => manager.is_empty())
    }

    pub fn capacity(&self) -> usize {
        dispatch!(self, manager => manager.capacity())
    }

    pub fn policy_name(&self) -> &'static str {
        dispatch!(self, manager => manager.policy_name())
    }
}

/// Builder for [`Cache`] instances.
#[derive(Debug, Clone, Copy)]
pub struct CacheBuilder {
    capacity: usize,
    kind: PolicyKind,
}

impl CacheBuilder {
    /// Starts a builder with the given capacity and LRU eviction.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            kind: PolicyKind::Lru,
        }
    }

    /// Selects the eviction policy.
    pub fn policy(mut self, kind: PolicyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builds the cache.
    pub fn build<K, V>(self) -> Cache<K, V>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        Cache::new(self.capacity, self.kind)
    }
}
