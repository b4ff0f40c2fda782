//! Disk-backed table.
//!
//! Records live in fixed-size blocks of the `tbl` file. A logical block
//! directory maps each block, in document order, to its physical block and
//! record count; blocks need not be full, so inserting and deleting only
//! moves records within one block and splices directory entries. The
//! directory is persisted to `tbli` on flush.

use super::TableAccess;
use crate::disk::{DiskManager, DiskManagerConfig};
use crate::lock::{FileLock, LockMode};
use basalt_buffer::{BlockPool, BlockPoolConfig};
use basalt_common::block::{files, BlockId, BLOCK_SIZE, NODES_PER_BLOCK, NODE_SIZE};
use basalt_common::{BasaltError, Result};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration for a disk table.
#[derive(Debug, Clone)]
pub struct TableDiskConfig {
    /// Store directory holding the table files.
    pub dir: PathBuf,
    /// Number of cached blocks (0 sizes the cache from available memory).
    pub cache_blocks: usize,
    /// Enable fsync on flush.
    pub fsync: bool,
}

impl TableDiskConfig {
    /// Creates a config for the given store directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache_blocks: 256,
            fsync: false,
        }
    }
}

/// Directory entry of one logical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockEntry {
    /// Physical block in the table file.
    block: BlockId,
    /// Pre value of the first record in the block.
    first_pre: usize,
    /// Number of records in the block.
    count: usize,
}

/// Block file and its cache.
struct TableFiles {
    disk: DiskManager,
    pool: BlockPool,
}

impl TableFiles {
    /// Brings a block into the cache.
    fn ensure(&mut self, block: BlockId) -> Result<()> {
        if self.pool.contains(block) {
            return Ok(());
        }
        let data = if block.0 < self.disk.num_blocks() {
            self.disk.read_block(block)?
        } else {
            Box::new([0u8; BLOCK_SIZE])
        };
        let (_, evicted) = self.pool.load(block, &data)?;
        if let Some(evicted) = evicted {
            trace!(block = %evicted.block_id, "writing back evicted block");
            self.disk.write_block(evicted.block_id, &evicted.data)?;
        }
        Ok(())
    }

    fn read(&mut self, block: BlockId) -> Result<&[u8; BLOCK_SIZE]> {
        self.ensure(block)?;
        self.pool
            .fetch(block)
            .map(|frame| &*frame.data())
            .ok_or(BasaltError::BlockNotFound { block: block.0 })
    }

    fn write(&mut self, block: BlockId) -> Result<&mut [u8; BLOCK_SIZE]> {
        self.ensure(block)?;
        self.pool
            .fetch(block)
            .map(|frame| frame.data_mut())
            .ok_or(BasaltError::BlockNotFound { block: block.0 })
    }

    /// Places a zeroed block into the cache.
    fn create(&mut self, block: BlockId) -> Result<&mut [u8; BLOCK_SIZE]> {
        let (frame, evicted) = self.pool.new_block(block)?;
        if let Some(evicted) = evicted {
            self.disk.write_block(evicted.block_id, &evicted.data)?;
        }
        Ok(frame.data_mut())
    }

    fn flush(&mut self) -> Result<usize> {
        let TableFiles { disk, pool } = self;
        let written = pool.flush_all(|block, data| disk.write_block(block, data))?;
        disk.flush()?;
        Ok(written)
    }
}

/// Node records stored in a block file.
pub struct TableDiskAccess {
    /// Path of the table file.
    path: PathBuf,
    /// Path of the block directory file.
    index_path: PathBuf,
    /// Logical blocks in document order.
    directory: Vec<BlockEntry>,
    /// Physical blocks released by deletions.
    free_blocks: Vec<u32>,
    /// Next never-used physical block.
    next_block: u32,
    /// Total number of records.
    records: usize,
    /// Block file and cache.
    files: Mutex<TableFiles>,
    /// Lock on the table file.
    lock: Option<FileLock>,
    /// The directory changed since the last flush.
    dirty: bool,
}

impl TableDiskAccess {
    /// Opens the table of a store directory, creating empty files if needed.
    pub fn open(config: TableDiskConfig) -> Result<Self> {
        let path = config.dir.join(files::TABLE);
        let index_path = config.dir.join(files::TABLE_INDEX);

        let disk = DiskManager::open(DiskManagerConfig {
            path: path.clone(),
            fsync_enabled: config.fsync,
        })?;
        let pool = if config.cache_blocks == 0 {
            BlockPool::auto_sized()
        } else {
            BlockPool::new(BlockPoolConfig {
                num_frames: config.cache_blocks,
            })
        };

        let (directory, free_blocks, next_block) = if index_path.exists() {
            read_index(&index_path)?
        } else {
            (Vec::new(), Vec::new(), disk.num_blocks())
        };

        let mut table = Self {
            path,
            index_path,
            directory,
            free_blocks,
            next_block,
            records: 0,
            files: Mutex::new(TableFiles { disk, pool }),
            lock: None,
            dirty: false,
        };
        table.renumber();
        debug!(
            path = %table.path.display(),
            records = table.records,
            blocks = table.directory.len(),
            "opened table"
        );
        Ok(table)
    }

    /// Returns the path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of logical blocks in use.
    pub fn block_count(&self) -> usize {
        self.directory.len()
    }

    /// Recomputes first pre values and the record count.
    fn renumber(&mut self) {
        let mut pre = 0;
        for entry in self.directory.iter_mut() {
            entry.first_pre = pre;
            pre += entry.count;
        }
        self.records = pre;
    }

    /// Finds the directory entry holding `pre` and the offset within it.
    fn locate(&self, pre: usize) -> Result<(usize, usize)> {
        if pre >= self.records {
            return Err(BasaltError::InvalidParameter {
                name: "pre".to_string(),
                value: pre.to_string(),
            });
        }
        let i = self
            .directory
            .partition_point(|e| e.first_pre <= pre)
            .saturating_sub(1);
        Ok((i, pre - self.directory[i].first_pre))
    }

    fn allocate_block(free_blocks: &mut Vec<u32>, next_block: &mut u32) -> BlockId {
        match free_blocks.pop() {
            Some(block) => BlockId(block),
            None => {
                let block = *next_block;
                *next_block += 1;
                BlockId(block)
            }
        }
    }

    fn write_index(&self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(12 + self.directory.len() * 6);
        buf.put_u32(self.next_block);
        buf.put_u32(self.directory.len() as u32);
        for entry in &self.directory {
            buf.put_u32(entry.block.0);
            buf.put_u16(entry.count as u16);
        }
        buf.put_u32(self.free_blocks.len() as u32);
        for &block in &self.free_blocks {
            buf.put_u32(block);
        }
        std::fs::write(&self.index_path, &buf)?;
        Ok(())
    }
}

fn corrupted(reason: &str) -> BasaltError {
    BasaltError::MetaCorrupted(format!("table index: {}", reason))
}

fn read_index(path: &Path) -> Result<(Vec<BlockEntry>, Vec<u32>, u32)> {
    let data = std::fs::read(path)?;
    let mut buf = &data[..];

    if buf.remaining() < 8 {
        return Err(corrupted("truncated header"));
    }
    let next_block = buf.get_u32();
    let entries = buf.get_u32() as usize;
    if buf.remaining() < entries * 6 + 4 {
        return Err(corrupted("truncated directory"));
    }
    let mut directory = Vec::with_capacity(entries);
    for _ in 0..entries {
        let block = BlockId(buf.get_u32());
        let count = buf.get_u16() as usize;
        if count == 0 || count > NODES_PER_BLOCK || block.0 >= next_block {
            return Err(corrupted("invalid block entry"));
        }
        directory.push(BlockEntry {
            block,
            first_pre: 0,
            count,
        });
    }
    let free = buf.get_u32() as usize;
    if buf.remaining() < free * 4 {
        return Err(corrupted("truncated free list"));
    }
    let free_blocks = (0..free).map(|_| buf.get_u32()).collect();
    Ok((directory, free_blocks, next_block))
}

impl TableAccess for TableDiskAccess {
    #[inline]
    fn len(&self) -> usize {
        self.records
    }

    fn read_record(&self, pre: usize) -> Result<[u8; NODE_SIZE]> {
        let (i, off) = self.locate(pre)?;
        let mut files = self.files.lock();
        let data = files.read(self.directory[i].block)?;
        let start = off * NODE_SIZE;
        let mut record = [0u8; NODE_SIZE];
        record.copy_from_slice(&data[start..start + NODE_SIZE]);
        Ok(record)
    }

    fn write_bytes(&mut self, pre: usize, off: usize, bytes: &[u8]) -> Result<()> {
        let (i, rec) = self.locate(pre)?;
        let block = self.directory[i].block;
        let data = self.files.get_mut().write(block)?;
        let start = rec * NODE_SIZE + off;
        data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn insert(&mut self, pre: usize, records: &[u8]) -> Result<()> {
        let n = records.len() / NODE_SIZE;
        if n == 0 {
            return Ok(());
        }

        let (i, off) = if self.directory.is_empty() {
            (0, 0)
        } else if pre >= self.records {
            let last = self.directory.len() - 1;
            (last, self.directory[last].count)
        } else {
            self.locate(pre)?
        };

        let Self {
            directory,
            files,
            free_blocks,
            next_block,
            ..
        } = self;
        let files = files.get_mut();

        if let Some(entry) = directory.get(i).copied() {
            if entry.count + n <= NODES_PER_BLOCK {
                let data = files.write(entry.block)?;
                data.copy_within(off * NODE_SIZE..entry.count * NODE_SIZE, (off + n) * NODE_SIZE);
                data[off * NODE_SIZE..(off + n) * NODE_SIZE].copy_from_slice(records);
                directory[i].count += n;
                self.dirty = true;
                self.renumber();
                return Ok(());
            }
        }

        // Split: the new records and the displaced tail fill the rest of
        // the current block, then as many new blocks as needed.
        let mut rest = Vec::with_capacity(records.len() + NODES_PER_BLOCK * NODE_SIZE);
        rest.extend_from_slice(records);
        let mut pos = i;
        if let Some(entry) = directory.get(i).copied() {
            let tail = files.read(entry.block)?[off * NODE_SIZE..entry.count * NODE_SIZE].to_vec();
            rest.extend_from_slice(&tail);

            let take = (NODES_PER_BLOCK - off).min(rest.len() / NODE_SIZE);
            let data = files.write(entry.block)?;
            data[off * NODE_SIZE..(off + take) * NODE_SIZE]
                .copy_from_slice(&rest[..take * NODE_SIZE]);
            directory[i].count = off + take;
            rest.drain(..take * NODE_SIZE);
            pos = i + 1;
        }

        let mut created = 0;
        for chunk in rest.chunks(BLOCK_SIZE) {
            let block = Self::allocate_block(free_blocks, next_block);
            let data = files.create(block)?;
            data[..chunk.len()].copy_from_slice(chunk);
            directory.insert(
                pos,
                BlockEntry {
                    block,
                    first_pre: 0,
                    count: chunk.len() / NODE_SIZE,
                },
            );
            pos += 1;
            created += 1;
        }
        trace!(pre, records = n, created, "split table block");

        self.dirty = true;
        self.renumber();
        Ok(())
    }

    fn delete(&mut self, pre: usize, count: usize) -> Result<()> {
        let count = count.min(self.records.saturating_sub(pre));
        if count == 0 {
            return Ok(());
        }

        let (mut i, mut off) = self.locate(pre)?;
        let files = self.files.get_mut();
        let mut remaining = count;
        while remaining > 0 {
            let entry = self.directory[i];
            let k = remaining.min(entry.count - off);
            if k == entry.count {
                self.directory.remove(i);
                files.pool.discard(entry.block);
                self.free_blocks.push(entry.block.0);
                trace!(block = %entry.block, "released table block");
            } else {
                let data = files.write(entry.block)?;
                data.copy_within((off + k) * NODE_SIZE..entry.count * NODE_SIZE, off * NODE_SIZE);
                self.directory[i].count -= k;
                i += 1;
            }
            remaining -= k;
            off = 0;
        }

        self.dirty = true;
        self.renumber();
        Ok(())
    }

    fn lock(&mut self, exclusive: bool) -> Result<bool> {
        if self.lock.is_none() {
            self.lock = Some(FileLock::open(&self.path)?);
        }
        let lock = self
            .lock
            .as_mut()
            .ok_or_else(|| BasaltError::Internal("table lock not open".to_string()))?;
        let mode = if exclusive {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        };
        Ok(lock.try_lock(mode)?)
    }

    fn flush(&mut self) -> Result<()> {
        let written = self.files.get_mut().flush()?;
        if self.dirty {
            self.write_index()?;
            self.dirty = false;
        }
        debug!(path = %self.path.display(), blocks = written, "flushed table");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        if let Some(mut lock) = self.lock.take() {
            lock.unlock()?;
        }
        flushed
    }
}
