//! LZ4 compression of stored values.

use basalt_common::{BasaltError, Result};

/// Compresses values at or above a size threshold.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    threshold: usize,
}

impl Compressor {
    /// Creates a compressor; a threshold of 0 disables compression.
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Returns the packed form of `raw` if packing applies and pays off.
    pub fn pack(&self, raw: &[u8]) -> Option<Vec<u8>> {
        if self.threshold == 0 || raw.len() < self.threshold {
            return None;
        }
        let packed = lz4_flex::compress_prepend_size(raw);
        (packed.len() < raw.len()).then_some(packed)
    }

    /// Restores a packed value.
    pub fn unpack(packed: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(packed)
            .map_err(|e| BasaltError::Compression(e.to_string()))
    }

    /// Returns the unpacked length recorded in a packed value's prefix.
    pub fn unpacked_len(prefix: &[u8]) -> Result<usize> {
        match prefix.get(..4) {
            Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize),
            None => Err(BasaltError::Compression("missing size prefix".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_not_packed() {
        let c = Compressor::new(64);
        assert!(c.pack(&[b'a'; 63]).is_none());
    }

    #[test]
    fn test_disabled() {
        let c = Compressor::new(0);
        assert!(c.pack(&[b'a'; 10_000]).is_none());
    }

    #[test]
    fn test_pack_unpack() {
        let c = Compressor::new(16);
        let raw = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(10);
        let packed = c.pack(&raw).unwrap();
        assert!(packed.len() < raw.len());
        assert_eq!(Compressor::unpacked_len(&packed).unwrap(), raw.len());
        assert_eq!(Compressor::unpack(&packed).unwrap(), raw);
    }

    #[test]
    fn test_incompressible_not_packed() {
        let c = Compressor::new(1);
        // Short random-looking input grows under LZ4
        assert!(c.pack(b"q7#Zx!").is_none());
    }

    #[test]
    fn test_unpack_garbage_fails() {
        assert!(matches!(
            Compressor::unpack(&[10, 0, 0, 0, 0xF0]),
            Err(BasaltError::Compression(_))
        ));
        assert!(Compressor::unpacked_len(&[1, 2]).is_err());
    }
}
