//! Error types for Basalt.

use thiserror::Error;

/// Result type alias using BasaltError.
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Errors that can occur in Basalt storage operations.
#[derive(Debug, Error)]
pub enum BasaltError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("Block not found: {block}")]
    BlockNotFound { block: u32 },

    #[error("Block cache full, unable to allocate frame")]
    CacheFull,

    #[error("Text store corrupted at offset {offset}: {reason}")]
    TextCorrupted { offset: u64, reason: String },

    #[error("Text too large: {size} bytes (max {max})")]
    TextTooLarge { size: usize, max: usize },

    #[error("Compression failed: {0}")]
    Compression(String),

    // Session errors
    #[error("Database '{0}' is opened by another process")]
    Pinned(String),

    #[error("Database '{0}' is being updated, or update was not completed")]
    Updating(String),

    #[error("Update marker of database '{0}' could not be created")]
    MarkerCreation(String),

    #[error("Update marker of database '{0}' could not be deleted")]
    MarkerDeletion(String),

    #[error("Database '{0}' has been closed")]
    Closed(String),

    #[error("Database '{0}' must be updated inside an update session")]
    NotUpdating(String),

    // Format errors
    #[error("Database was created with a newer storage version: {found} (supported: {supported})")]
    StoreVersion { found: String, supported: String },

    #[error("Database was created with a newer index version: {found} (supported: {supported})")]
    IndexVersion { found: String, supported: String },

    #[error("Metadata corrupted: {0}")]
    MetaCorrupted(String),

    // Capacity errors
    #[error("Too many distinct names: max {max}")]
    TooManyNames { max: usize },

    #[error("Too many distinct namespaces: max {max}")]
    TooManyNamespaces { max: usize },

    // Input errors
    #[error("Namespace prefix not bound: {0}")]
    UnboundPrefix(String),

    #[error("Invalid build sequence: {0}")]
    InvalidBuild(String),

    #[error("Database not found: {0}")]
    StoreNotFound(String),

    #[error("Database already exists: {0}")]
    StoreExists(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BasaltError {
    /// Returns true for session errors the caller can surface and retry later.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            BasaltError::Pinned(_)
                | BasaltError::Updating(_)
                | BasaltError::MarkerCreation(_)
                | BasaltError::MarkerDeletion(_)
                | BasaltError::Closed(_)
                | BasaltError::NotUpdating(_)
        )
    }

    /// Returns true for errors caused by a store written by a newer version.
    pub fn is_version_error(&self) -> bool {
        matches!(
            self,
            BasaltError::StoreVersion { .. } | BasaltError::IndexVersion { .. }
        )
    }
}
