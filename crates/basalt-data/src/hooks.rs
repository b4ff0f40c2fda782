//! Update hooks for external indexes and resource bookkeeping.

use crate::reader::NodeReader;
use basalt_common::Result;

/// Receives structural changes of a store.
///
/// `on_delete` is called before records are removed or overwritten and
/// `on_insert` after new records are in place. A replace reports the
/// eviction first. Hooks run inside the caller's update session and must
/// not mutate the store.
pub trait UpdateHook: Send {
    /// The subtree `[pre, pre + size)` whose root has `id` is about to go.
    fn on_delete(&mut self, reader: &dyn NodeReader, pre: usize, id: u32, size: usize)
        -> Result<()>;

    /// The records `[pre, pre + size)` starting with `id` were added.
    fn on_insert(&mut self, reader: &dyn NodeReader, pre: usize, id: u32, size: usize)
        -> Result<()>;
}

/// Positions of the document nodes of a store.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    docs: Vec<usize>,
}

impl Resources {
    /// Creates the list from document positions in ascending order.
    pub fn new(docs: Vec<usize>) -> Self {
        Self { docs }
    }

    /// Returns the document positions in ascending order.
    pub fn docs(&self) -> &[usize] {
        &self.docs
    }

    /// Registers `count` records at `pre` containing the documents `added`.
    pub fn insert(&mut self, pre: usize, count: usize, added: &[usize]) {
        for doc in self.docs.iter_mut() {
            if *doc >= pre {
                *doc += count;
            }
        }
        let at = self.docs.partition_point(|&d| d < pre);
        self.docs.splice(at..at, added.iter().copied());
    }

    /// Removes the documents in `[pre, pre + size)`.
    pub fn delete(&mut self, pre: usize, size: usize) {
        self.docs.retain(|&d| d < pre || d >= pre + size);
        for doc in self.docs.iter_mut() {
            if *doc >= pre + size {
                *doc -= size;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_insert() {
        let mut res = Resources::new(vec![0, 5]);
        res.insert(5, 3, &[5]);
        assert_eq!(res.docs(), &[0, 5, 8]);
        res.insert(0, 2, &[]);
        assert_eq!(res.docs(), &[2, 7, 10]);
    }

    #[test]
    fn test_resources_delete() {
        let mut res = Resources::new(vec![0, 4, 9]);
        res.delete(4, 5);
        assert_eq!(res.docs(), &[0, 4]);
        res.delete(0, 4);
        assert_eq!(res.docs(), &[0]);
    }
}
