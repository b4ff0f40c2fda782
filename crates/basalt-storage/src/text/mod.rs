//! Text store: out-of-line storage for texts and attribute values.
//!
//! Records reference their value through a 40-bit [`TextRef`]. Small
//! non-negative integers are inlined into the reference and never reach
//! the backing store.

mod compress;
mod disk;
mod memory;

pub use compress::Compressor;
pub use disk::{DiskValues, DiskValuesConfig};
pub use memory::MemValues;

use basalt_common::Result;

/// Flag marking an inlined integer.
const INLINE: u64 = 1 << 39;
/// Flag marking a compressed entry.
const COMPRESSED: u64 = 1 << 38;
/// Mask of the offset bits.
const OFFSET_MASK: u64 = COMPRESSED - 1;
/// Largest inlined integer.
pub const MAX_INLINE: u64 = INLINE - 1;
/// Largest addressable offset.
pub const MAX_OFFSET: u64 = OFFSET_MASK;

/// Reference to a stored value as kept in the 5-byte record field.
///
/// Bit 39 marks an inline integer held in bits 0-38. Otherwise bit 38
/// marks a compressed entry and bits 0-37 hold the byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRef(u64);

impl TextRef {
    /// Wraps a raw 40-bit field value.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw & (INLINE | MAX_INLINE))
    }

    /// Returns the raw 40-bit field value.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Creates an inline integer reference.
    #[inline]
    pub fn inline(value: u64) -> Self {
        Self(INLINE | (value & MAX_INLINE))
    }

    /// Creates an offset reference.
    #[inline]
    pub fn offset(offset: u64, compressed: bool) -> Self {
        let flag = if compressed { COMPRESSED } else { 0 };
        Self(flag | (offset & OFFSET_MASK))
    }

    /// Returns the reference for `value` if it can be inlined.
    ///
    /// Only canonical decimals are inlined (no sign, no leading zeros), so
    /// that reading the reference back yields the original bytes.
    pub fn try_inline(value: &[u8]) -> Option<Self> {
        if value.is_empty() || value.len() > 12 || !value.iter().all(u8::is_ascii_digit) {
            return None;
        }
        if value.len() > 1 && value[0] == b'0' {
            return None;
        }
        let n = value
            .iter()
            .fold(0u64, |n, &d| n * 10 + (d - b'0') as u64);
        (n <= MAX_INLINE).then(|| Self::inline(n))
    }

    /// Returns true if this reference holds an inline integer.
    #[inline]
    pub fn is_inline(&self) -> bool {
        self.0 & INLINE != 0
    }

    /// Returns true if the referenced entry is compressed.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        !self.is_inline() && self.0 & COMPRESSED != 0
    }

    /// Returns the inline integer, if any.
    #[inline]
    pub fn inline_value(&self) -> Option<u64> {
        self.is_inline().then_some(self.0 & MAX_INLINE)
    }

    /// Returns the byte offset of an out-of-line entry.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.0 & OFFSET_MASK
    }
}

/// Storage for variable-length values.
///
/// Implementors provide the out-of-line operations; inlined integers are
/// handled by the provided methods.
pub trait TextStore {
    /// Stores bytes out of line.
    fn put(&mut self, value: &[u8]) -> Result<TextRef>;

    /// Reads out-of-line bytes.
    fn get(&self, r: TextRef) -> Result<Vec<u8>>;

    /// Releases an out-of-line entry.
    fn release(&mut self, r: TextRef) -> Result<()>;

    /// Returns the byte length of an out-of-line entry.
    fn get_length(&self, r: TextRef) -> Result<usize>;

    /// Stores a value and returns its reference.
    fn store(&mut self, value: &[u8]) -> Result<TextRef> {
        match TextRef::try_inline(value) {
            Some(r) => Ok(r),
            None => self.put(value),
        }
    }

    /// Reads the value of a reference.
    fn read(&self, r: TextRef) -> Result<Vec<u8>> {
        match r.inline_value() {
            Some(n) => Ok(n.to_string().into_bytes()),
            None => self.get(r),
        }
    }

    /// Marks the storage of a reference as reusable.
    fn free(&mut self, r: TextRef) -> Result<()> {
        if r.is_inline() {
            return Ok(());
        }
        self.release(r)
    }

    /// Frees the old value and stores a new one.
    fn replace(&mut self, old: TextRef, value: &[u8]) -> Result<TextRef> {
        self.free(old)?;
        self.store(value)
    }

    /// Returns the byte length of a value.
    fn length(&self, r: TextRef) -> Result<usize> {
        match r.inline_value() {
            Some(n) => Ok(n.to_string().len()),
            None => self.get_length(r),
        }
    }

    /// Writes pending changes to disk.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flushes and closes the store.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}
