//! Block pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::replacer::{ClockReplacer, Replacer};
use basalt_common::block::{BlockId, BLOCK_SIZE};
use basalt_common::{BasaltError, Result};
use std::collections::HashMap;
use sysinfo::System;

/// A dirty block that was evicted from the pool.
/// Caller must write it to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedBlock {
    pub block_id: BlockId,
    pub data: Box<[u8; BLOCK_SIZE]>,
}

/// Configuration for the block pool.
#[derive(Debug, Clone)]
pub struct BlockPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BlockPoolConfig {
    fn default() -> Self {
        Self { num_frames: 256 }
    }
}

/// Block pool manager.
///
/// Caches table blocks in a fixed number of frames with:
/// - Block ID to frame ID mapping
/// - Free frame list for new blocks
/// - Clock replacement for eviction
/// - Dirty block tracking for write-back
///
/// The pool has a single owner; callers that share it wrap it in a lock.
pub struct BlockPool {
    /// Configuration.
    config: BlockPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Block ID to frame ID mapping.
    block_table: HashMap<BlockId, FrameId>,
    /// List of free frame IDs.
    free_list: Vec<FrameId>,
    /// Block replacement policy.
    replacer: ClockReplacer,
}

impl BlockPool {
    /// Creates a new block pool. A pool always has at least one frame.
    pub fn new(config: BlockPoolConfig) -> Self {
        let num_frames = config.num_frames.max(1);
        let frames = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();
        // Reversed so that pop() hands out frame 0 first
        let free_list = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            config: BlockPoolConfig { num_frames },
            frames,
            block_table: HashMap::with_capacity(num_frames),
            free_list,
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Creates a block pool sized to 1/64 of available system RAM.
    ///
    /// At least 64 frames are allocated so that small machines still cache
    /// a useful part of the table.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let num_frames = (available_bytes / 64 / BLOCK_SIZE).max(64);

        Self::new(BlockPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Returns the number of blocks currently in the pool.
    pub fn block_count(&self) -> usize {
        self.block_table.len()
    }

    /// Checks if a block is in the pool.
    pub fn contains(&self, block_id: BlockId) -> bool {
        self.block_table.contains_key(&block_id)
    }

    /// Fetches a cached block, or None if it is not in the pool.
    #[inline]
    pub fn fetch(&mut self, block_id: BlockId) -> Option<&mut BufferFrame> {
        let frame_id = *self.block_table.get(&block_id)?;
        self.replacer.record_access(frame_id);
        Some(&mut self.frames[frame_id.0 as usize])
    }

    /// Allocates a frame, evicting a cached block if the free list is empty.
    fn allocate_frame(&mut self) -> Result<(FrameId, Option<EvictedBlock>)> {
        if let Some(frame_id) = self.free_list.pop() {
            return Ok((frame_id, None));
        }

        let victim_id = self.replacer.evict().ok_or(BasaltError::CacheFull)?;
        let frame = &mut self.frames[victim_id.0 as usize];
        let evicted = match frame.block_id() {
            Some(block_id) => {
                self.block_table.remove(&block_id);
                if frame.is_dirty() {
                    Some(EvictedBlock {
                        block_id,
                        data: Box::new(*frame.data()),
                    })
                } else {
                    None
                }
            }
            None => None,
        };
        Ok((victim_id, evicted))
    }

    /// Places a zeroed block into the pool.
    ///
    /// If the block is already cached, its frame is returned unchanged.
    /// Returns the frame and any evicted dirty block the caller must write.
    pub fn new_block(
        &mut self,
        block_id: BlockId,
    ) -> Result<(&mut BufferFrame, Option<EvictedBlock>)> {
        if let Some(&frame_id) = self.block_table.get(&block_id) {
            self.replacer.record_access(frame_id);
            return Ok((&mut self.frames[frame_id.0 as usize], None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;
        self.block_table.insert(block_id, frame_id);
        self.replacer.set_evictable(frame_id, true);
        self.replacer.record_access(frame_id);

        let frame = &mut self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_block_id(Some(block_id));
        Ok((frame, evicted))
    }

    /// Loads block data read from disk into the pool.
    ///
    /// Returns the frame and any evicted dirty block the caller must write.
    pub fn load(
        &mut self,
        block_id: BlockId,
        data: &[u8; BLOCK_SIZE],
    ) -> Result<(&mut BufferFrame, Option<EvictedBlock>)> {
        let (frame, evicted) = self.new_block(block_id)?;
        frame.copy_from(data);
        frame.set_dirty(false);
        Ok((frame, evicted))
    }

    /// Writes all dirty blocks through the callback and marks them clean.
    ///
    /// Returns the number of blocks written.
    pub fn flush_all<F>(&mut self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(BlockId, &[u8; BLOCK_SIZE]) -> Result<()>,
    {
        let mut flushed = 0;
        for frame in self.frames.iter_mut() {
            if !frame.is_dirty() {
                continue;
            }
            if let Some(block_id) = frame.block_id() {
                flush_fn(block_id, frame.data())?;
                flushed += 1;
            }
            frame.set_dirty(false);
        }
        Ok(flushed)
    }

    /// Drops a block from the pool without writing it.
    ///
    /// Returns true if the block was cached.
    pub fn discard(&mut self, block_id: BlockId) -> bool {
        match self.block_table.remove(&block_id) {
            Some(frame_id) => {
                self.replacer.remove(frame_id);
                self.frames[frame_id.0 as usize].reset();
                self.free_list.push(frame_id);
                true
            }
            None => false,
        }
    }
}
