//! Configuration structures for Basalt stores.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full-text tokenization options persisted with a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtOptions {
    /// Apply stemming to tokens.
    pub stemming: bool,
    /// Keep case of tokens.
    pub case_sensitive: bool,
    /// Keep diacritics of tokens.
    pub diacritics: bool,
    /// Path to a stopword list.
    pub stopwords: Option<PathBuf>,
    /// Language code used for tokenization.
    pub language: String,
}

impl Default for FtOptions {
    fn default() -> Self {
        Self {
            stemming: false,
            case_sensitive: false,
            diacritics: false,
            stopwords: None,
            language: "en".to_string(),
        }
    }
}

/// Storage configuration for Basalt stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per disk store.
    pub db_path: PathBuf,
    /// Flush after every update session and guard it with a crash marker.
    pub autoflush: bool,
    /// Enable fsync when flushing files.
    pub fsync: bool,
    /// Maintain auxiliary indexes and the id-to-pre map on every update.
    pub update_index: bool,
    /// Whitespace-only texts were chopped when the store was built.
    pub chop: bool,
    /// Texts of at least this many bytes are compressed (0 disables compression).
    pub compress_threshold: usize,
    /// Number of table blocks cached in memory (0 sizes the cache from available memory).
    pub table_cache_blocks: usize,
    /// A text value index is present.
    pub text_index: bool,
    /// An attribute value index is present.
    pub attr_index: bool,
    /// A token index is present.
    pub token_index: bool,
    /// A full-text index is present.
    pub ft_index: bool,
    /// Full-text tokenization options.
    pub ft: FtOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data"),
            autoflush: true,
            fsync: false,
            update_index: false,
            chop: true,
            compress_threshold: 128,
            table_cache_blocks: 256, // 1 MB with 4 KB blocks
            text_index: true,
            attr_index: true,
            token_index: false,
            ft_index: false,
            ft: FtOptions::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a config rooted at the given directory.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// Returns the directory of the named store.
    pub fn store_dir(&self, name: &str) -> PathBuf {
        self.db_path.join(name)
    }

    /// Set autoflush.
    pub fn autoflush(mut self, enabled: bool) -> Self {
        self.autoflush = enabled;
        self
    }

    /// Set fsync on flush.
    pub fn fsync(mut self, enabled: bool) -> Self {
        self.fsync = enabled;
        self
    }

    /// Set live update indexing.
    pub fn update_index(mut self, enabled: bool) -> Self {
        self.update_index = enabled;
        self
    }

    /// Set the compression threshold in bytes.
    pub fn compress_threshold(mut self, bytes: usize) -> Self {
        self.compress_threshold = bytes;
        self
    }

    /// Set the number of cached table blocks.
    pub fn table_cache_blocks(mut self, blocks: usize) -> Self {
        self.table_cache_blocks = blocks;
        self
    }
}
