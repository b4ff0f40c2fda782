//! Memory-backed text store with interning.

use super::{TextRef, TextStore};
use basalt_common::{BasaltError, Result};
use std::collections::HashMap;

/// Values kept in memory; equal values share one entry and one reference.
#[derive(Debug, Default)]
pub struct MemValues {
    /// Distinct values; the reference offset is the index.
    values: Vec<Vec<u8>>,
    /// Value to index.
    index: HashMap<Vec<u8>, usize>,
}

impl MemValues {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct out-of-line values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no value is stored out of line.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn entry(&self, r: TextRef) -> Result<&Vec<u8>> {
        self.values
            .get(r.file_offset() as usize)
            .ok_or_else(|| BasaltError::TextCorrupted {
                offset: r.file_offset(),
                reason: "unknown value id".to_string(),
            })
    }
}

impl TextStore for MemValues {
    fn put(&mut self, value: &[u8]) -> Result<TextRef> {
        if let Some(&i) = self.index.get(value) {
            return Ok(TextRef::offset(i as u64, false));
        }
        let i = self.values.len();
        self.values.push(value.to_vec());
        self.index.insert(value.to_vec(), i);
        Ok(TextRef::offset(i as u64, false))
    }

    fn get(&self, r: TextRef) -> Result<Vec<u8>> {
        self.entry(r).cloned()
    }

    fn release(&mut self, _r: TextRef) -> Result<()> {
        // Interned entries may be referenced by other records
        Ok(())
    }

    fn get_length(&self, r: TextRef) -> Result<usize> {
        Ok(self.entry(r)?.len())
    }
}
