//! Disk-backed text store with free-space reuse.
//!
//! Each entry is a 4-byte big-endian payload length followed by the
//! payload, which is LZ4-packed when the reference carries the compressed
//! flag. Freed entries become gaps in an offset-keyed free list; adjacent
//! gaps are merged and a gap reaching the end of the file shrinks it.

use super::compress::Compressor;
use super::{TextRef, TextStore, MAX_OFFSET};
use basalt_common::{BasaltError, Result};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Size of the entry length header.
const HEADER: u64 = 4;

/// Configuration for a disk text store.
#[derive(Debug, Clone)]
pub struct DiskValuesConfig {
    /// Path of the value file.
    pub path: PathBuf,
    /// Path of the persisted free list.
    pub free_path: PathBuf,
    /// Values of at least this many bytes are compressed (0 disables).
    pub compress_threshold: usize,
    /// Enable fsync on flush.
    pub fsync: bool,
}

impl DiskValuesConfig {
    /// Creates a config for a value file and its free list.
    pub fn new(path: impl Into<PathBuf>, free_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            free_path: free_path.into(),
            compress_threshold: 128,
            fsync: false,
        }
    }
}

/// Texts or attribute values stored in a file.
pub struct DiskValues {
    /// Configuration.
    config: DiskValuesConfig,
    /// The value file.
    file: Mutex<File>,
    /// End of the used part of the file.
    end: u64,
    /// Free gaps keyed by offset, valued by byte size.
    free: BTreeMap<u64, u64>,
    /// Compression policy.
    compressor: Compressor,
}

impl DiskValues {
    /// Opens or creates a value file.
    pub fn open(config: DiskValuesConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.path)?;
        let end = file.metadata()?.len();
        let free = if config.free_path.exists() {
            read_free_list(&config.free_path, end)?
        } else {
            BTreeMap::new()
        };

        debug!(path = %config.path.display(), bytes = end, gaps = free.len(), "opened value file");
        Ok(Self {
            compressor: Compressor::new(config.compress_threshold),
            config,
            file: Mutex::new(file),
            end,
            free,
        })
    }

    /// Returns the end of the used part of the file.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Returns the number of free gaps.
    pub fn gap_count(&self) -> usize {
        self.free.len()
    }

    /// Reserves `needed` bytes, reusing the first gap that is large enough.
    fn allocate(&mut self, needed: u64) -> u64 {
        let found = self
            .free
            .iter()
            .find(|&(_, &size)| size >= needed)
            .map(|(&off, &size)| (off, size));
        if let Some((off, size)) = found {
            self.free.remove(&off);
            if size > needed {
                self.free.insert(off + needed, size - needed);
            }
            trace!(offset = off, bytes = needed, "reusing free gap");
            return off;
        }
        let off = self.end;
        self.end += needed;
        off
    }

    /// Returns a byte range to the free list.
    fn add_gap(&mut self, mut off: u64, mut size: u64) {
        let prev = self.free.range(..off).next_back().map(|(&o, &s)| (o, s));
        if let Some((prev_off, prev_size)) = prev {
            if prev_off + prev_size == off {
                self.free.remove(&prev_off);
                off = prev_off;
                size += prev_size;
            }
        }
        if let Some(next_size) = self.free.remove(&(off + size)) {
            size += next_size;
        }
        if off + size == self.end {
            self.end = off;
        } else {
            self.free.insert(off, size);
        }
    }

    /// Reads the payload length stored at an offset.
    fn header(file: &mut File, off: u64, end: u64) -> Result<u64> {
        if off + HEADER > end {
            return Err(BasaltError::TextCorrupted {
                offset: off,
                reason: "offset beyond end of file".to_string(),
            });
        }
        file.seek(SeekFrom::Start(off))?;
        let mut len = [0u8; 4];
        file.read_exact(&mut len)?;
        let len = u32::from_be_bytes(len) as u64;
        if off + HEADER + len > end {
            return Err(BasaltError::TextCorrupted {
                offset: off,
                reason: format!("entry of {} bytes exceeds file", len),
            });
        }
        Ok(len)
    }
}

fn read_free_list(path: &Path, end: u64) -> Result<BTreeMap<u64, u64>> {
    let data = std::fs::read(path)?;
    let mut buf = &data[..];
    let corrupted = |reason: &str| BasaltError::MetaCorrupted(format!("free list: {}", reason));

    if buf.remaining() < 4 {
        return Err(corrupted("truncated header"));
    }
    let count = buf.get_u32() as usize;
    if buf.remaining() < count * 16 {
        return Err(corrupted("truncated entries"));
    }
    let mut free = BTreeMap::new();
    for _ in 0..count {
        let off = buf.get_u64();
        let size = buf.get_u64();
        if off + size > end {
            return Err(corrupted("gap beyond end of file"));
        }
        free.insert(off, size);
    }
    Ok(free)
}

impl TextStore for DiskValues {
    fn put(&mut self, value: &[u8]) -> Result<TextRef> {
        let (payload, compressed) = match self.compressor.pack(value) {
            Some(packed) => (Cow::Owned(packed), true),
            None => (Cow::Borrowed(value), false),
        };
        if payload.len() > u32::MAX as usize {
            return Err(BasaltError::TextTooLarge {
                size: payload.len(),
                max: u32::MAX as usize,
            });
        }

        let off = self.allocate(HEADER + payload.len() as u64);
        if off > MAX_OFFSET {
            return Err(BasaltError::TextTooLarge {
                size: off as usize,
                max: MAX_OFFSET as usize,
            });
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(off))?;
        file.write_all(&(payload.len() as u32).to_be_bytes())?;
        file.write_all(&payload)?;
        Ok(TextRef::offset(off, compressed))
    }

    fn get(&self, r: TextRef) -> Result<Vec<u8>> {
        let off = r.file_offset();
        let mut file = self.file.lock();
        let len = Self::header(&mut file, off, self.end)?;
        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        if r.is_compressed() {
            Compressor::unpack(&payload)
        } else {
            Ok(payload)
        }
    }

    fn release(&mut self, r: TextRef) -> Result<()> {
        let off = r.file_offset();
        let len = Self::header(self.file.get_mut(), off, self.end)?;
        self.add_gap(off, HEADER + len);
        Ok(())
    }

    fn get_length(&self, r: TextRef) -> Result<usize> {
        let off = r.file_offset();
        let mut file = self.file.lock();
        let len = Self::header(&mut file, off, self.end)?;
        if !r.is_compressed() {
            return Ok(len as usize);
        }
        let mut prefix = [0u8; 4];
        file.read_exact(&mut prefix)?;
        Compressor::unpacked_len(&prefix)
    }

    fn flush(&mut self) -> Result<()> {
        let file = self.file.get_mut();
        if file.metadata()?.len() > self.end {
            file.set_len(self.end)?;
        }
        file.flush()?;
        if self.config.fsync {
            file.sync_all()?;
        }

        let mut buf = BytesMut::with_capacity(4 + self.free.len() * 16);
        buf.put_u32(self.free.len() as u32);
        for (&off, &size) in &self.free {
            buf.put_u64(off);
            buf.put_u64(size);
        }
        std::fs::write(&self.config.free_path, &buf)?;
        debug!(path = %self.config.path.display(), bytes = self.end, "flushed value file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path, threshold: usize) -> DiskValues {
        let mut config = DiskValuesConfig::new(dir.join("txt"), dir.join("txtl"));
        config.compress_threshold = threshold;
        DiskValues::open(config).unwrap()
    }

    #[test]
    fn test_store_read() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let a = values.store(b"hello").unwrap();
        let b = values.store(b"world!").unwrap();
        assert_eq!(values.read(a).unwrap(), b"hello");
        assert_eq!(values.read(b).unwrap(), b"world!");
        assert_eq!(values.length(b).unwrap(), 6);
        assert_eq!(b.file_offset(), 9);
    }

    #[test]
    fn test_inline_integers_skip_file() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let r = values.store(b"4711").unwrap();
        assert!(r.is_inline());
        assert_eq!(values.end(), 0);
        assert_eq!(values.read(r).unwrap(), b"4711");
        assert_eq!(values.length(r).unwrap(), 4);
        values.free(r).unwrap();
    }

    #[test]
    fn test_empty_value() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let r = values.store(b"").unwrap();
        assert!(!r.is_inline());
        assert_eq!(values.read(r).unwrap(), b"");
    }

    #[test]
    fn test_compression_transparent() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 32);
        let long = b"the quick brown fox ".repeat(20);
        let short = b"not compressed";

        let l = values.store(&long).unwrap();
        let s = values.store(short).unwrap();
        assert!(l.is_compressed());
        assert!(!s.is_compressed());
        assert_eq!(values.read(l).unwrap(), long);
        assert_eq!(values.length(l).unwrap(), long.len());
        assert_eq!(values.read(s).unwrap(), short);
    }

    #[test]
    fn test_freed_gap_reused() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let a = values.store(b"aaaaaaaaaa").unwrap();
        let _b = values.store(b"bbbb").unwrap();
        let end = values.end();

        values.free(a).unwrap();
        assert_eq!(values.gap_count(), 1);

        let c = values.store(b"ccc").unwrap();
        assert_eq!(c.file_offset(), a.file_offset());
        assert_eq!(values.end(), end);
        assert_eq!(values.read(c).unwrap(), b"ccc");
    }

    #[test]
    fn test_too_large_for_gap_appends() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let a = values.store(b"ab").unwrap();
        let _b = values.store(b"cd").unwrap();
        values.free(a).unwrap();

        let end = values.end();
        let c = values.store(b"much longer value").unwrap();
        assert_eq!(c.file_offset(), end);
        assert_eq!(values.gap_count(), 1);
    }

    #[test]
    fn test_adjacent_gaps_coalesce() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let a = values.store(b"one").unwrap();
        let b = values.store(b"two").unwrap();
        let c = values.store(b"three").unwrap();
        let _d = values.store(b"four").unwrap();

        values.free(a).unwrap();
        values.free(c).unwrap();
        assert_eq!(values.gap_count(), 2);
        values.free(b).unwrap();
        assert_eq!(values.gap_count(), 1);

        let e = values.store(b"spans three").unwrap();
        assert_eq!(e.file_offset(), 0);
    }

    #[test]
    fn test_free_at_end_shrinks() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let a = values.store(b"keep").unwrap();
        let b = values.store(b"drop").unwrap();
        values.free(b).unwrap();
        assert_eq!(values.end(), b.file_offset());
        assert_eq!(values.gap_count(), 0);
        assert_eq!(values.read(a).unwrap(), b"keep");
    }

    #[test]
    fn test_replace() {
        let dir = tempdir().unwrap();
        let mut values = open(dir.path(), 0);
        let a = values.store(b"first").unwrap();
        let _b = values.store(b"pin").unwrap();
        let r = values.replace(a, b"again").unwrap();
        assert_eq!(r.file_offset(), a.file_offset());
        assert_eq!(values.read(r).unwrap(), b"again");
    }

    #[test]
    fn test_persisted_free_list() {
        let dir = tempdir().unwrap();
        let (kept, freed) = {
            let mut values = open(dir.path(), 0);
            let a = values.store(b"freed value").unwrap();
            let b = values.store(b"kept value").unwrap();
            values.free(a).unwrap();
            values.close().unwrap();
            (b, a)
        };
        let mut values = open(dir.path(), 0);
        assert_eq!(values.read(kept).unwrap(), b"kept value");
        assert_eq!(values.gap_count(), 1);
        let r = values.store(b"reuse").unwrap();
        assert_eq!(r.file_offset(), freed.file_offset());
    }

    #[test]
    fn test_corrupted_offset() {
        let dir = tempdir().unwrap();
        let values = open(dir.path(), 0);
        let result = values.read(TextRef::offset(100, false));
        assert!(matches!(result, Err(BasaltError::TextCorrupted { offset: 100, .. })));
    }
}
