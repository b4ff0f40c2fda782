//! Basalt document store.
//!
//! This crate provides the XML document store built on the node table and
//! text stores of `basalt-storage`:
//! - Token dictionaries for names, prefixes and namespace uris
//! - The namespace tree and its insertion scope
//! - Insert, delete, replace, rename and value updates that keep sizes,
//!   distances and namespaces consistent
//! - Update sessions with an exclusive lock and a crash marker
//! - Metadata persistence, update hooks and a store builder

pub mod builder;
pub mod context;
pub mod data;
pub mod hooks;
pub mod idmap;
pub mod meta;
pub mod namespaces;
pub mod reader;
pub mod tokens;

pub use builder::Builder;
pub use context::Context;
pub use data::{Data, DiskData, MemData, StoreState};
pub use hooks::{Resources, UpdateHook};
pub use idmap::IdPreMap;
pub use meta::{MetaData, StoredMeta, INDEX_VERSION, STORAGE_VERSION};
pub use namespaces::{Namespaces, NsScope};
pub use reader::{Bindings, DataClip, NodeReader};
pub use tokens::TokenSet;
