//! Block cache for Basalt node tables.
//!
//! This crate provides in-memory caching of table blocks with:
//! - Fixed-size pool with configurable frame count
//! - Clock eviction policy for cache management
//! - Dirty block tracking for write-back

mod frame;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BlockPool, BlockPoolConfig, EvictedBlock};
pub use replacer::{ClockReplacer, Replacer};
