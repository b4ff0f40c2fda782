//! Block and record geometry for Basalt storage.

use serde::{Deserialize, Serialize};

/// Size of a single node record in bytes.
pub const NODE_SIZE: usize = 16;

/// Power of two of the node record size.
pub const NODE_POWER: usize = 4;

/// Power of two of the block size.
pub const BLOCK_POWER: usize = 12;

/// Size of a table block in bytes (4 KB).
pub const BLOCK_SIZE: usize = 1 << BLOCK_POWER;

/// Number of node records stored in one block.
pub const NODES_PER_BLOCK: usize = BLOCK_SIZE >> NODE_POWER;

/// Largest value of the narrow attribute-size and attribute-distance fields.
///
/// A stored value equal to this sentinel means the real value has to be
/// recomputed by scanning neighbouring attribute records.
pub const MAX_ATTS: usize = 0x1F;

/// Physical block number within the table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Creates a new BlockId.
    pub fn new(num: u32) -> Self {
        Self(num)
    }

    /// Returns the byte offset of this block in the table file.
    pub fn file_offset(&self) -> u64 {
        (self.0 as u64) << BLOCK_POWER
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block:{}", self.0)
    }
}

/// Names of the files making up a disk store.
pub mod files {
    /// Node records.
    pub const TABLE: &str = "tbl";
    /// Logical block directory of the table.
    pub const TABLE_INDEX: &str = "tbli";
    /// Texts of document, text, comment and PI nodes.
    pub const TEXTS: &str = "txt";
    /// Attribute values.
    pub const VALUES: &str = "atv";
    /// Free list of the text file.
    pub const TEXTS_FREE: &str = "txtl";
    /// Free list of the attribute value file.
    pub const VALUES_FREE: &str = "atvl";
    /// Metadata, dictionaries and namespaces.
    pub const META: &str = "inf";
    /// Crash marker written while an update session is active.
    pub const UPDATE_MARKER: &str = "upd";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_constants() {
        assert_eq!(NODE_SIZE, 1 << NODE_POWER);
        assert_eq!(BLOCK_SIZE, 4096);
        assert_eq!(NODES_PER_BLOCK, 256);
        assert_eq!(NODES_PER_BLOCK * NODE_SIZE, BLOCK_SIZE);
        assert_eq!(MAX_ATTS, 31);
    }

    #[test]
    fn test_block_id_offset() {
        assert_eq!(BlockId::new(0).file_offset(), 0);
        assert_eq!(BlockId::new(3).file_offset(), 3 * BLOCK_SIZE as u64);
    }

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId::new(7).to_string(), "block:7");
    }

    #[test]
    fn test_block_id_ordering() {
        assert!(BlockId::new(1) < BlockId::new(2));
        assert_eq!(BlockId::new(5), BlockId(5));
    }

    #[test]
    fn test_block_id_serde_roundtrip() {
        let original = BlockId::new(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: BlockId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_file_names_distinct() {
        let names = [
            files::TABLE,
            files::TABLE_INDEX,
            files::TEXTS,
            files::VALUES,
            files::TEXTS_FREE,
            files::VALUES_FREE,
            files::META,
            files::UPDATE_MARKER,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
