//! Memory-backed table.

use super::TableAccess;
use basalt_common::block::NODE_SIZE;
use basalt_common::{BasaltError, Result};

/// Node records kept in a growable buffer.
#[derive(Debug, Clone, Default)]
pub struct TableMemAccess {
    data: Vec<u8>,
}

impl TableMemAccess {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with room for `records` records.
    pub fn with_capacity(records: usize) -> Self {
        Self {
            data: Vec::with_capacity(records * NODE_SIZE),
        }
    }

    /// Returns the raw record bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn check(&self, pre: usize) -> Result<usize> {
        if pre >= self.len() {
            return Err(BasaltError::InvalidParameter {
                name: "pre".to_string(),
                value: pre.to_string(),
            });
        }
        Ok(pre * NODE_SIZE)
    }
}

impl TableAccess for TableMemAccess {
    #[inline]
    fn len(&self) -> usize {
        self.data.len() / NODE_SIZE
    }

    #[inline]
    fn read_record(&self, pre: usize) -> Result<[u8; NODE_SIZE]> {
        let start = self.check(pre)?;
        let mut record = [0u8; NODE_SIZE];
        record.copy_from_slice(&self.data[start..start + NODE_SIZE]);
        Ok(record)
    }

    #[inline]
    fn write_bytes(&mut self, pre: usize, off: usize, bytes: &[u8]) -> Result<()> {
        let start = self.check(pre)? + off;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn insert(&mut self, pre: usize, records: &[u8]) -> Result<()> {
        let at = (pre * NODE_SIZE).min(self.data.len());
        self.data.splice(at..at, records.iter().copied());
        Ok(())
    }

    fn delete(&mut self, pre: usize, count: usize) -> Result<()> {
        let start = (pre * NODE_SIZE).min(self.data.len());
        let end = ((pre + count) * NODE_SIZE).min(self.data.len());
        self.data.drain(start..end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(first: u8) -> [u8; NODE_SIZE] {
        let mut r = [0u8; NODE_SIZE];
        r[0] = first;
        r
    }

    #[test]
    fn test_insert_and_read() {
        let mut table = TableMemAccess::with_capacity(4);
        assert!(table.is_empty());
        table.insert(0, &record(1)).unwrap();
        table.insert(1, &record(3)).unwrap();
        table.insert(1, &record(2)).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.read1(0, 0).unwrap(), 1);
        assert_eq!(table.read1(1, 0).unwrap(), 2);
        assert_eq!(table.read1(2, 0).unwrap(), 3);
        assert_eq!(table.as_bytes().len(), 3 * NODE_SIZE);
    }

    #[test]
    fn test_delete_compacts() {
        let mut table = TableMemAccess::new();
        for i in 0..5 {
            table.insert(i, &record(i as u8)).unwrap();
        }
        table.delete(1, 3).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.read1(1, 0).unwrap(), 4);
    }

    #[test]
    fn test_out_of_range_read_fails() {
        let table = TableMemAccess::new();
        assert!(matches!(
            table.read_record(0),
            Err(BasaltError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_write_bytes_offset() {
        let mut table = TableMemAccess::new();
        table.insert(0, &record(0)).unwrap();
        table.write_bytes(0, 12, &[1, 2, 3, 4]).unwrap();
        assert_eq!(table.read4(0, 12).unwrap(), 0x0102_0304);
    }
}
