//! Core data structures shared by the cache policies.

pub mod ghost_list;
pub mod intrusive_list;
pub mod slot_arena;

pub use ghost_list::GhostList;
pub use intrusive_list::{IntrusiveList, NodeId};
pub use slot_arena::{Slot, SlotArena, SlotId};
