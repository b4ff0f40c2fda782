//! Table access: random access to a sequence of fixed-size node records.
//!
//! A table is addressed by pre value (record position) and byte offset within
//! the record. All multi-byte values are big-endian. Inserting and deleting
//! records renumbers every later position.

mod disk;
mod memory;

pub use disk::{TableDiskAccess, TableDiskConfig};
pub use memory::TableMemAccess;

use basalt_common::block::NODE_SIZE;
use basalt_common::Result;

/// Random access to node records.
pub trait TableAccess {
    /// Returns the number of records.
    fn len(&self) -> usize;

    /// Returns true if the table holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the record at `pre`.
    fn read_record(&self, pre: usize) -> Result<[u8; NODE_SIZE]>;

    /// Overwrites bytes of the record at `pre`, starting at `off`.
    fn write_bytes(&mut self, pre: usize, off: usize, bytes: &[u8]) -> Result<()>;

    /// Splices whole records in at `pre`, moving later records up.
    ///
    /// `records.len()` must be a multiple of [`NODE_SIZE`].
    fn insert(&mut self, pre: usize, records: &[u8]) -> Result<()>;

    /// Removes `count` records starting at `pre`, moving later records down.
    fn delete(&mut self, pre: usize, count: usize) -> Result<()>;

    /// Replaces `count` records at `pre` by `records`.
    ///
    /// The overlapping part is overwritten in place; the table then grows or
    /// shrinks by the difference.
    fn replace(&mut self, pre: usize, records: &[u8], count: usize) -> Result<()> {
        let new_count = records.len() / NODE_SIZE;
        let shared = new_count.min(count);
        for i in 0..shared {
            let start = i * NODE_SIZE;
            self.write_bytes(pre + i, 0, &records[start..start + NODE_SIZE])?;
        }
        if new_count > count {
            self.insert(pre + shared, &records[shared * NODE_SIZE..])?;
        } else if count > new_count {
            self.delete(pre + shared, count - new_count)?;
        }
        Ok(())
    }

    /// Acquires the table lock, shared or exclusive.
    ///
    /// Returns false if a conflicting lock is held elsewhere.
    fn lock(&mut self, _exclusive: bool) -> Result<bool> {
        Ok(true)
    }

    /// Writes cached changes to disk.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flushes the table and releases its lock.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reads one byte.
    #[inline]
    fn read1(&self, pre: usize, off: usize) -> Result<u8> {
        Ok(self.read_record(pre)?[off])
    }

    /// Reads two bytes.
    #[inline]
    fn read2(&self, pre: usize, off: usize) -> Result<u16> {
        let r = self.read_record(pre)?;
        Ok(u16::from_be_bytes([r[off], r[off + 1]]))
    }

    /// Reads four bytes.
    #[inline]
    fn read4(&self, pre: usize, off: usize) -> Result<u32> {
        let r = self.read_record(pre)?;
        Ok(u32::from_be_bytes([r[off], r[off + 1], r[off + 2], r[off + 3]]))
    }

    /// Reads five bytes.
    #[inline]
    fn read5(&self, pre: usize, off: usize) -> Result<u64> {
        let r = self.read_record(pre)?;
        Ok(r[off..off + 5]
            .iter()
            .fold(0u64, |v, &b| (v << 8) | b as u64))
    }

    /// Writes one byte.
    #[inline]
    fn write1(&mut self, pre: usize, off: usize, value: u8) -> Result<()> {
        self.write_bytes(pre, off, &[value])
    }

    /// Writes two bytes.
    #[inline]
    fn write2(&mut self, pre: usize, off: usize, value: u16) -> Result<()> {
        self.write_bytes(pre, off, &value.to_be_bytes())
    }

    /// Writes four bytes.
    #[inline]
    fn write4(&mut self, pre: usize, off: usize, value: u32) -> Result<()> {
        self.write_bytes(pre, off, &value.to_be_bytes())
    }

    /// Writes the low five bytes of `value`.
    #[inline]
    fn write5(&mut self, pre: usize, off: usize, value: u64) -> Result<()> {
        self.write_bytes(pre, off, &value.to_be_bytes()[3..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(values: &[u8]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(NODE_SIZE))
            .collect()
    }

    fn firsts<T: TableAccess>(table: &T) -> Vec<u8> {
        (0..table.len()).map(|p| table.read1(p, 0).unwrap()).collect()
    }

    #[test]
    fn test_wide_reads_and_writes() {
        let mut table = TableMemAccess::new();
        table.insert(0, &records(&[0])).unwrap();

        table.write2(0, 1, 0xBEEF).unwrap();
        table.write4(0, 4, 0x0102_0304).unwrap();
        table.write5(0, 8, 0xAB_CDEF_0123).unwrap();

        assert_eq!(table.read2(0, 1).unwrap(), 0xBEEF);
        assert_eq!(table.read1(0, 1).unwrap(), 0xBE);
        assert_eq!(table.read4(0, 4).unwrap(), 0x0102_0304);
        assert_eq!(table.read5(0, 8).unwrap(), 0xAB_CDEF_0123);
        assert_eq!(table.read1(0, 8).unwrap(), 0xAB);
        assert_eq!(table.read1(0, 13).unwrap(), 0);
    }

    #[test]
    fn test_write5_drops_high_bytes() {
        let mut table = TableMemAccess::new();
        table.insert(0, &records(&[0])).unwrap();
        table.write5(0, 3, 0xFFFF_FF12_3456_789A).unwrap();
        assert_eq!(table.read5(0, 3).unwrap(), 0x12_3456_789A);
        assert_eq!(table.read1(0, 2).unwrap(), 0);
    }

    #[test]
    fn test_replace_grow() {
        let mut table = TableMemAccess::new();
        table.insert(0, &records(&[1, 2, 3])).unwrap();
        table.replace(1, &records(&[7, 8, 9]), 1).unwrap();
        assert_eq!(firsts(&table), vec![1, 7, 8, 9, 3]);
    }

    #[test]
    fn test_replace_shrink() {
        let mut table = TableMemAccess::new();
        table.insert(0, &records(&[1, 2, 3, 4, 5])).unwrap();
        table.replace(1, &records(&[9]), 3).unwrap();
        assert_eq!(firsts(&table), vec![1, 9, 5]);
    }

    #[test]
    fn test_replace_same_size() {
        let mut table = TableMemAccess::new();
        table.insert(0, &records(&[1, 2, 3])).unwrap();
        table.replace(0, &records(&[4, 5]), 2).unwrap();
        assert_eq!(firsts(&table), vec![4, 5, 3]);
    }

    #[test]
    fn test_default_lock_always_succeeds() {
        let mut table = TableMemAccess::new();
        assert!(table.lock(true).unwrap());
        assert!(table.lock(false).unwrap());
        table.flush().unwrap();
        table.close().unwrap();
    }
}
