//! Read interface shared by stores, clips and hooks.

use basalt_common::{NodeKind, Result};

/// Namespace bindings as (prefix, uri) pairs.
pub type Bindings = Vec<(Vec<u8>, Vec<u8>)>;

/// Read access to the records of a store.
///
/// Object safe, so clips and hooks can work with any store backend.
pub trait NodeReader {
    /// Returns the number of records.
    fn node_count(&self) -> usize;

    /// Returns the kind of a node.
    fn node_kind(&self, pre: usize) -> Result<NodeKind>;

    /// Returns the subtree size of a node.
    fn node_size(&self, pre: usize) -> Result<usize>;

    /// Returns the distance of a node to its parent.
    fn node_dist(&self, pre: usize) -> Result<usize>;

    /// Returns 1 + the number of attributes of an element.
    fn node_att_size(&self, pre: usize) -> Result<usize>;

    /// Returns the stable id of a node.
    fn node_id(&self, pre: usize) -> Result<u32>;

    /// Returns the name of an element or attribute, or the target of a
    /// processing instruction.
    fn node_name(&self, pre: usize) -> Result<Vec<u8>>;

    /// Returns the namespace uri of an element or attribute.
    fn node_uri(&self, pre: usize) -> Result<Vec<u8>>;

    /// Returns the stored text of a node: the document name, the attribute
    /// value, or the text, comment or processing-instruction content.
    fn node_text(&self, pre: usize) -> Result<Vec<u8>>;

    /// Returns the namespaces declared by an element.
    fn ns_declared(&self, pre: usize) -> Result<Bindings>;

    /// Returns all namespaces visible at an element.
    fn ns_in_scope(&self, pre: usize) -> Result<Bindings>;
}

/// A contiguous range of records of a store, used as insertion source.
///
/// The range `[start, end)` holds one or more complete subtrees.
pub struct DataClip<'a> {
    pub data: &'a dyn NodeReader,
    pub start: usize,
    pub end: usize,
    /// Number of top-level subtrees.
    pub fragments: usize,
}

impl<'a> DataClip<'a> {
    /// Creates a clip of the subtrees in `[start, end)`.
    pub fn new(data: &'a dyn NodeReader, start: usize, end: usize) -> Result<Self> {
        let mut fragments = 0;
        let mut pre = start;
        while pre < end {
            pre += data.node_size(pre)?;
            fragments += 1;
        }
        Ok(Self {
            data,
            start,
            end,
            fragments,
        })
    }

    /// Creates a clip of all records of a store.
    pub fn all(data: &'a dyn NodeReader) -> Result<Self> {
        Self::new(data, 0, data.node_count())
    }

    /// Creates a clip of the subtree at `pre`.
    pub fn subtree(data: &'a dyn NodeReader, pre: usize) -> Result<Self> {
        let size = data.node_size(pre)?;
        Ok(Self {
            data,
            start: pre,
            end: pre + size,
            fragments: 1,
        })
    }

    /// Returns the number of records.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the clip holds no records.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}
