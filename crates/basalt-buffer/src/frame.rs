//! Buffer frame management.

use basalt_common::block::{BlockId, BLOCK_SIZE};

/// Unique identifier for a frame in the block pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true if this is a valid frame ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A frame in the block pool holding a single table block.
pub struct BufferFrame {
    /// Frame identifier.
    frame_id: FrameId,
    /// The block currently stored in this frame.
    block_id: Option<BlockId>,
    /// Block data buffer.
    data: Box<[u8; BLOCK_SIZE]>,
    /// Whether the block has been modified since it was loaded or written.
    is_dirty: bool,
}

impl BufferFrame {
    /// Creates a new empty buffer frame.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            block_id: None,
            data: Box::new([0u8; BLOCK_SIZE]),
            is_dirty: false,
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the block currently stored in this frame.
    #[inline]
    pub fn block_id(&self) -> Option<BlockId> {
        self.block_id
    }

    /// Sets the block held by this frame.
    #[inline]
    pub fn set_block_id(&mut self, block_id: Option<BlockId>) {
        self.block_id = block_id;
    }

    /// Returns true if the block has been modified.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Sets the dirty flag.
    #[inline]
    pub fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    /// Returns the block data.
    #[inline]
    pub fn data(&self) -> &[u8; BLOCK_SIZE] {
        &self.data
    }

    /// Returns the block data for writing and marks the frame dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        self.is_dirty = true;
        &mut self.data
    }

    /// Copies a full block into this frame without marking it dirty.
    pub fn copy_from(&mut self, src: &[u8; BLOCK_SIZE]) {
        self.data.copy_from_slice(src);
    }

    /// Clears the frame so it can hold another block.
    pub fn reset(&mut self) {
        self.block_id = None;
        self.is_dirty = false;
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_validity() {
        assert!(FrameId(0).is_valid());
        assert!(!FrameId::INVALID.is_valid());
        assert_eq!(FrameId(3).to_string(), "frame:3");
    }

    #[test]
    fn test_new_frame_is_empty() {
        let frame = BufferFrame::new(FrameId(1));
        assert_eq!(frame.frame_id(), FrameId(1));
        assert!(frame.block_id().is_none());
        assert!(!frame.is_dirty());
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_data_mut_marks_dirty() {
        let mut frame = BufferFrame::new(FrameId(0));
        frame.data_mut()[10] = 0xAB;
        assert!(frame.is_dirty());
        assert_eq!(frame.data()[10], 0xAB);
    }

    #[test]
    fn test_copy_from_keeps_clean() {
        let mut frame = BufferFrame::new(FrameId(0));
        let block = [7u8; BLOCK_SIZE];
        frame.copy_from(&block);
        assert!(!frame.is_dirty());
        assert_eq!(frame.data()[BLOCK_SIZE - 1], 7);
    }

    #[test]
    fn test_reset() {
        let mut frame = BufferFrame::new(FrameId(0));
        frame.set_block_id(Some(BlockId(4)));
        frame.data_mut()[0] = 1;
        frame.reset();
        assert!(frame.block_id().is_none());
        assert!(!frame.is_dirty());
        assert_eq!(frame.data()[0], 0);
    }
}
