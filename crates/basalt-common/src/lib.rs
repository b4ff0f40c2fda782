//! Basalt common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all Basalt components.

pub mod block;
pub mod config;
pub mod error;
pub mod kind;

pub use block::{files, BlockId, BLOCK_SIZE, MAX_ATTS, NODES_PER_BLOCK, NODE_SIZE};
pub use config::{FtOptions, StoreConfig};
pub use error::{BasaltError, Result};
pub use kind::NodeKind;
