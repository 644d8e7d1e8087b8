//! sectorcache: cache replacement policies and a remote-backed cached
//! block device built on them.
//!
//! The crate has two halves. The first is an in-memory cache engine: a
//! fixed-capacity slot arena ([`ds::slot_arena`]), six eviction policies
//! ([`policy`]) that thread intrusive lists through the arena, and a
//! mutex-guarded [`manager::CacheManager`] exposing lookup/insert/
//! invalidate plus pinning and dirty tracking. The second half uses the
//! engine as the buffer cache of a block device whose authoritative
//! contents live on a TCP page server ([`server`], [`client`],
//! [`device`]).
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod builder;
pub mod client;
pub mod device;
pub mod ds;
pub mod error;
mod fsutil;
pub mod manager;
pub mod policy;
pub mod prelude;
pub mod proto;
pub mod server;

pub use error::{Error, Result};
