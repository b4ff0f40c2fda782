//! Block replacement policies for the block pool.

use crate::frame::FrameId;
use std::collections::HashSet;

/// Trait for block replacement algorithms.
pub trait Replacer: Send {
    /// Records that the given frame was accessed.
    fn record_access(&mut self, frame_id: FrameId);

    /// Marks a frame as a candidate for eviction, or withdraws it.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&mut self) -> Option<FrameId>;

    /// Removes a frame from the replacer.
    fn remove(&mut self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Clock replacement algorithm.
///
/// Frames sit on a circular buffer with one reference bit each. The hand
/// skips and clears referenced frames and evicts the first unreferenced
/// evictable frame it meets. Two full rotations always find a victim when
/// any frame is evictable.
pub struct ClockReplacer {
    /// Total number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<bool>,
    /// Set of evictable frame IDs.
    evictable: HashSet<FrameId>,
    /// Current clock hand position.
    clock_hand: usize,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: vec![false; num_frames],
            evictable: HashSet::new(),
            clock_hand: 0,
        }
    }

    /// Returns the total capacity.
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    #[inline]
    fn in_range(&self, frame_id: FrameId) -> bool {
        (frame_id.0 as usize) < self.num_frames
    }
}

impl Replacer for ClockReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if self.in_range(frame_id) {
            self.reference_bits[frame_id.0 as usize] = true;
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if !self.in_range(frame_id) {
            return;
        }
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.evictable.is_empty() {
            return None;
        }

        for _ in 0..(2 * self.num_frames) {
            let hand = self.clock_hand;
            let frame_id = FrameId(hand as u32);
            self.clock_hand = (hand + 1) % self.num_frames;

            if self.evictable.contains(&frame_id) {
                if self.reference_bits[hand] {
                    self.reference_bits[hand] = false;
                } else {
                    self.evictable.remove(&frame_id);
                    return Some(frame_id);
                }
            }
        }

        None
    }

    fn remove(&mut self, frame_id: FrameId) {
        if self.in_range(frame_id) {
            self.evictable.remove(&frame_id);
            self.reference_bits[frame_id.0 as usize] = false;
        }
    }

    fn size(&self) -> usize {
        self.evictable.len()
    }
}
