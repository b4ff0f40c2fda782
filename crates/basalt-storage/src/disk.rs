//! Disk manager for block-level file I/O.

use basalt_common::block::{BlockId, BLOCK_SIZE};
use basalt_common::{BasaltError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path of the block file.
    pub path: PathBuf,
    /// Enable fsync after flushing.
    pub fsync_enabled: bool,
}

impl DiskManagerConfig {
    /// Creates a config for the given file with fsync disabled.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync_enabled: false,
        }
    }
}

/// Reads and writes fixed-size blocks of a single file.
///
/// Block `n` occupies bytes `[n * BLOCK_SIZE, (n + 1) * BLOCK_SIZE)`.
/// Writing past the end extends the file.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// The open file.
    file: File,
    /// Number of blocks in the file.
    num_blocks: u32,
}

impl DiskManager {
    /// Opens or creates the block file.
    pub fn open(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.path)?;

        let file_size = file.metadata()?.len();
        let num_blocks = (file_size / BLOCK_SIZE as u64) as u32;

        Ok(Self {
            config,
            file,
            num_blocks,
        })
    }

    /// Returns the path of the block file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns the number of blocks in the file.
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Reads a block from disk.
    pub fn read_block(&mut self, block_id: BlockId) -> Result<Box<[u8; BLOCK_SIZE]>> {
        if block_id.0 >= self.num_blocks {
            return Err(BasaltError::BlockNotFound { block: block_id.0 });
        }

        self.file.seek(SeekFrom::Start(block_id.file_offset()))?;
        let mut buffer = Box::new([0u8; BLOCK_SIZE]);
        self.file.read_exact(&mut buffer[..])?;
        Ok(buffer)
    }

    /// Writes a block to disk.
    pub fn write_block(&mut self, block_id: BlockId, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.file.seek(SeekFrom::Start(block_id.file_offset()))?;
        self.file.write_all(data)?;

        if block_id.0 >= self.num_blocks {
            self.num_blocks = block_id.0 + 1;
        }
        Ok(())
    }

    /// Cuts the file down to the given number of blocks.
    pub fn truncate(&mut self, num_blocks: u32) -> Result<()> {
        if num_blocks < self.num_blocks {
            self.file.set_len(BlockId(num_blocks).file_offset())?;
            self.num_blocks = num_blocks;
        }
        Ok(())
    }

    /// Flushes pending writes, syncing to disk if fsync is enabled.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.config.fsync_enabled {
            self.file.sync_all()?;
        }
        Ok(())
    }
}
