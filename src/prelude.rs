//! Convenience re-exports for the common entry points.

pub use crate::builder::{Cache, CacheBuilder, PolicyKind};
pub use crate::device::{CachedDevice, DeviceConfig};
pub use crate::error::{Error, Result};
pub use crate::manager::{CacheCore, CacheManager, CacheStats, InsertOutcome};
pub use crate::policy::{
    ArcPolicy, ClockPolicy, EvictionPolicy, FifoPolicy, LfuPolicy, LruPolicy, SievePolicy,
};
