//! Mapping from stable node ids to positions.

/// Marker of a deleted id.
const NONE: u32 = u32::MAX;

/// Maps node ids to their current positions.
///
/// Maintained when live index updates are enabled; otherwise positions are
/// found by scanning the table.
#[derive(Debug, Clone, Default)]
pub struct IdPreMap {
    pres: Vec<u32>,
}

impl IdPreMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map from the ids of a table in document order.
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut map = Self::new();
        for (pre, id) in ids.into_iter().enumerate() {
            map.set(id, pre);
        }
        map
    }

    fn set(&mut self, id: u32, pre: usize) {
        let id = id as usize;
        if id >= self.pres.len() {
            self.pres.resize(id + 1, NONE);
        }
        self.pres[id] = pre as u32;
    }

    /// Returns the position of an id.
    pub fn pre(&self, id: u32) -> Option<usize> {
        match self.pres.get(id as usize) {
            Some(&pre) if pre != NONE => Some(pre as usize),
            _ => None,
        }
    }

    /// Registers `count` nodes at `pre` whose ids start at `first_id`.
    pub fn insert(&mut self, pre: usize, first_id: u32, count: usize) {
        let pre32 = pre as u32;
        for p in self.pres.iter_mut() {
            if *p != NONE && *p >= pre32 {
                *p += count as u32;
            }
        }
        for i in 0..count {
            self.set(first_id + i as u32, pre + i);
        }
    }

    /// Removes the nodes in `[pre, pre + count)`.
    pub fn delete(&mut self, pre: usize, count: usize) {
        let start = pre as u32;
        let end = (pre + count) as u32;
        for p in self.pres.iter_mut() {
            if *p == NONE || *p < start {
                continue;
            }
            if *p < end {
                *p = NONE;
            } else {
                *p -= count as u32;
            }
        }
    }
}
