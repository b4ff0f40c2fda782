//! Storage layer for Basalt.
//!
//! This crate provides:
//! - The 16-byte node record codec and a buffer for new records
//! - Table access over node records, in memory or in a cached block file
//! - Disk manager for block-level file I/O
//! - Text stores for texts and attribute values, with inline integers,
//!   LZ4 compression and free-space reuse on disk, and interning in memory
//! - Advisory file locks

mod disk;
mod lock;
pub mod record;
mod table;
mod text;

pub use disk::{DiskManager, DiskManagerConfig};
pub use lock::{FileLock, LockMode};
pub use record::RecordBuffer;
pub use table::{TableAccess, TableDiskAccess, TableDiskConfig, TableMemAccess};
pub use text::{
    Compressor, DiskValues, DiskValuesConfig, MemValues, TextRef, TextStore, MAX_INLINE,
    MAX_OFFSET,
};
