//! Namespace engine.
//!
//! Declarations are kept outside the node table in a tree of [`NsNode`]s that
//! mirrors the nesting of the declaring elements. Every node covers the
//! subtree of its element, so the bindings visible at a position are found by
//! descending from the root and walking back up. [`NsScope`] tracks bindings
//! while a batch of records is built for an insertion.

mod scope;

pub use scope::NsScope;

use crate::tokens::{read_token, read_u32, write_token, TokenSet, XML_PREFIX};
use basalt_common::{BasaltError, Result};
use basalt_storage::{record, TableAccess};
use bytes::{BufMut, BytesMut};

/// Maximum number of distinct prefixes.
pub const MAX_PREFIXES: usize = u16::MAX as usize;

/// Maximum number of distinct namespace uris.
pub const MAX_URIS: usize = u8::MAX as usize;

/// Index of the root node, which stands for the position before the table.
const ROOT: usize = 0;

/// One declaring element and the bindings it introduces.
#[derive(Debug, Clone)]
struct NsNode {
    /// Position of the declaring element.
    pre: usize,
    /// Bindings as (prefix id, uri id) pairs.
    values: Vec<(u32, u32)>,
    /// Child nodes sorted by position.
    children: Vec<usize>,
}

impl NsNode {
    fn new(pre: usize) -> Self {
        Self {
            pre,
            values: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Namespace declarations of a store.
#[derive(Debug, Clone)]
pub struct Namespaces {
    prefixes: TokenSet,
    uris: TokenSet,
    /// Node arena; slot 0 is the root.
    nodes: Vec<NsNode>,
    /// Arena slots available for reuse.
    free: Vec<usize>,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespaces {
    /// Creates an empty namespace structure.
    pub fn new() -> Self {
        Self {
            prefixes: TokenSet::new(MAX_PREFIXES),
            uris: TokenSet::new(MAX_URIS),
            nodes: vec![NsNode::new(0)],
            free: Vec::new(),
        }
    }

    /// Returns true if no element declares a namespace.
    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].children.is_empty() && self.nodes[ROOT].values.is_empty()
    }

    /// Returns the number of declaring elements.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len() - 1
    }

    /// Returns the id of a prefix, adding it if it is new.
    pub fn prefix_index(&mut self, prefix: &[u8]) -> Result<u32> {
        self.prefixes
            .index(prefix)
            .ok_or(BasaltError::TooManyNamespaces { max: MAX_PREFIXES })
    }

    /// Returns the id of a uri, adding it if it is new.
    pub fn uri_index(&mut self, uri: &[u8]) -> Result<u32> {
        self.uris
            .index(uri)
            .ok_or(BasaltError::TooManyNamespaces { max: MAX_URIS })
    }

    /// Returns the id of a known uri.
    pub fn uri_id(&self, uri: &[u8]) -> Option<u32> {
        self.uris.id(uri)
    }

    /// Returns the id of a known prefix.
    pub fn prefix_id(&self, prefix: &[u8]) -> Option<u32> {
        self.prefixes.id(prefix)
    }

    /// Returns the uri of an id.
    pub fn uri(&self, id: u32) -> &[u8] {
        self.uris.key(id)
    }

    /// Returns the prefix of an id.
    pub fn prefix(&self, id: u32) -> &[u8] {
        self.prefixes.key(id)
    }

    /// Returns the deepest node whose element contains `pre`.
    fn find<T: TableAccess + ?Sized>(&self, pre: usize, table: &T) -> Result<usize> {
        Ok(self.ancestors(pre, table)?.first().copied().unwrap_or(ROOT))
    }

    /// Returns the chain of nodes from the deepest node containing `pre` up
    /// to the root.
    fn ancestors<T: TableAccess + ?Sized>(&self, pre: usize, table: &T) -> Result<Vec<usize>> {
        let mut chain = Vec::new();
        let mut node = ROOT;
        chain.push(node);
        loop {
            let children = &self.nodes[node].children;
            let i = children.partition_point(|&c| self.nodes[c].pre <= pre);
            if i == 0 {
                break;
            }
            let child = children[i - 1];
            let start = self.nodes[child].pre;
            let size = record::size(table, start, record::kind(table, start)?)?;
            if pre >= start + size {
                break;
            }
            chain.push(child);
            node = child;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Returns the bindings declared by the element at `pre` as
    /// (prefix id, uri id) pairs.
    pub fn values<T: TableAccess + ?Sized>(&self, pre: usize, table: &T) -> Result<Vec<(u32, u32)>> {
        let node = self.find(pre, table)?;
        if node != ROOT && self.nodes[node].pre == pre {
            Ok(self.nodes[node].values.clone())
        } else {
            Ok(Vec::new())
        }
    }

    /// Returns all bindings visible at `pre`, innermost first, with shadowed
    /// prefixes removed.
    pub fn in_scope<T: TableAccess + ?Sized>(&self, pre: usize, table: &T) -> Result<Vec<(u32, u32)>> {
        let mut bindings: Vec<(u32, u32)> = Vec::new();
        for node in self.ancestors(pre, table)? {
            for &(prefix, uri) in &self.nodes[node].values {
                if !bindings.iter().any(|&(p, _)| p == prefix) {
                    bindings.push((prefix, uri));
                }
            }
        }
        Ok(bindings)
    }

    /// Returns the uri id bound to `prefix` at `pre`, or 0.
    ///
    /// An empty uri undeclares a default namespace and resolves to 0.
    pub fn uri_id_for_prefix<T: TableAccess + ?Sized>(
        &self,
        prefix: &[u8],
        pre: usize,
        table: &T,
    ) -> Result<u32> {
        if prefix == XML_PREFIX {
            return Ok(0);
        }
        let Some(prefix) = self.prefixes.id(prefix) else {
            return Ok(0);
        };
        for node in self.ancestors(pre, table)? {
            if let Some(&(_, uri)) = self.nodes[node].values.iter().find(|&&(p, _)| p == prefix) {
                return Ok(if self.uris.key(uri).is_empty() { 0 } else { uri });
            }
        }
        Ok(0)
    }

    /// Adds a binding to the element at `pre` and returns the uri id.
    pub fn add<T: TableAccess + ?Sized>(
        &mut self,
        pre: usize,
        prefix: &[u8],
        uri: &[u8],
        table: &T,
    ) -> Result<u32> {
        let binding = (self.prefix_index(prefix)?, self.uri_index(uri)?);
        self.add_node(pre, &[binding], table)?;
        Ok(binding.1)
    }

    /// Adds bindings to the element at `pre`, creating its node if needed.
    ///
    /// A new node adopts the existing nodes inside its element. The table
    /// must reflect the final sizes of all elements.
    pub fn add_node<T: TableAccess + ?Sized>(
        &mut self,
        pre: usize,
        bindings: &[(u32, u32)],
        table: &T,
    ) -> Result<()> {
        let parent = self.find(pre, table)?;
        let node = if parent != ROOT && self.nodes[parent].pre == pre {
            parent
        } else {
            let end = pre + record::size(table, pre, record::kind(table, pre)?)?;
            let children = &self.nodes[parent].children;
            let from = children.partition_point(|&c| self.nodes[c].pre < pre);
            let to = children.partition_point(|&c| self.nodes[c].pre < end);
            let adopted: Vec<usize> = self.nodes[parent].children.drain(from..to).collect();

            let mut created = NsNode::new(pre);
            created.children = adopted;
            let node = self.alloc(created);
            self.nodes[parent].children.insert(from, node);
            node
        };
        let values = &mut self.nodes[node].values;
        for &(prefix, uri) in bindings {
            match values.iter_mut().find(|(p, _)| *p == prefix) {
                Some(entry) => entry.1 = uri,
                None => values.push((prefix, uri)),
            }
        }
        Ok(())
    }

    fn alloc(&mut self, node: NsNode) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Removes the nodes of the elements in `[pre, pre + size)` and moves
    /// all following nodes back by `size`.
    pub fn delete(&mut self, pre: usize, size: usize) {
        let end = pre + size;
        let mut stack = vec![ROOT];
        while let Some(node) = stack.pop() {
            let children = std::mem::take(&mut self.nodes[node].children);
            let mut kept = Vec::with_capacity(children.len());
            for child in children {
                let start = self.nodes[child].pre;
                if start >= pre && start < end {
                    self.release(child);
                } else {
                    kept.push(child);
                    stack.push(child);
                }
            }
            self.nodes[node].children = kept;
        }
        self.shift(end, -(size as isize));
    }

    /// Returns a subtree of nodes to the free list.
    fn release(&mut self, node: usize) {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            stack.extend(std::mem::take(&mut self.nodes[n].children));
            self.nodes[n].values.clear();
            self.free.push(n);
        }
    }

    /// Moves every node at or after `from` by `delta` positions.
    pub fn shift(&mut self, from: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        let mut stack = vec![ROOT];
        while let Some(node) = stack.pop() {
            if node != ROOT && self.nodes[node].pre >= from {
                let moved = self.nodes[node].pre as isize + delta;
                self.nodes[node].pre = moved.max(0) as usize;
            }
            stack.extend(self.nodes[node].children.iter().copied());
        }
    }

    /// Serializes the dictionaries and the node tree in pre-order.
    pub fn write(&self, buf: &mut BytesMut) {
        self.prefixes.write(buf);
        self.uris.write(buf);
        let mut stack = vec![ROOT];
        while let Some(node) = stack.pop() {
            let n = &self.nodes[node];
            buf.put_u32(n.pre as u32);
            buf.put_u32(n.values.len() as u32);
            for &(prefix, uri) in &n.values {
                buf.put_u32(prefix);
                buf.put_u32(uri);
            }
            buf.put_u32(n.children.len() as u32);
            stack.extend(n.children.iter().rev().copied());
        }
    }

    /// Deserializes a structure written by [`Namespaces::write`].
    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        let prefixes = TokenSet::read(buf, MAX_PREFIXES)?;
        let uris = TokenSet::read(buf, MAX_URIS)?;
        let mut nodes: Vec<NsNode> = Vec::new();
        // (node, children still to read)
        let mut open: Vec<(usize, usize)> = Vec::new();
        loop {
            let mut node = NsNode::new(read_u32(buf)? as usize);
            let count = read_u32(buf)? as usize;
            for _ in 0..count {
                let prefix = read_u32(buf)?;
                let uri = read_u32(buf)?;
                if prefix as usize > prefixes.len() || uri as usize > uris.len() {
                    return Err(BasaltError::MetaCorrupted(
                        "namespace binding out of range".to_string(),
                    ));
                }
                node.values.push((prefix, uri));
            }
            let children = read_u32(buf)? as usize;
            let index = nodes.len();
            nodes.push(node);
            if let Some((parent, remaining)) = open.last_mut() {
                *remaining -= 1;
                nodes[*parent].children.push(index);
            }
            if children > 0 {
                open.push((index, children));
            }
            while matches!(open.last(), Some(&(_, 0))) {
                open.pop();
            }
            if open.is_empty() {
                break;
            }
        }
        Ok(Self {
            prefixes,
            uris,
            nodes,
            free: Vec::new(),
        })
    }

    /// Returns the bindings of the element at `pre` as token pairs.
    pub fn declared<T: TableAccess + ?Sized>(
        &self,
        pre: usize,
        table: &T,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.tokens(&self.values(pre, table)?))
    }

    /// Returns the bindings visible at `pre` as token pairs.
    pub fn visible<T: TableAccess + ?Sized>(
        &self,
        pre: usize,
        table: &T,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.tokens(&self.in_scope(pre, table)?))
    }

    fn tokens(&self, bindings: &[(u32, u32)]) -> Vec<(Vec<u8>, Vec<u8>)> {
        bindings
            .iter()
            .map(|&(p, u)| (self.prefixes.key(p).to_vec(), self.uris.key(u).to_vec()))
            .collect()
    }

    /// Returns the positions of all declaring elements in document order.
    pub fn positions(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.nodes[ROOT].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(self.nodes[node].pre);
            stack.extend(self.nodes[node].children.iter().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_common::NodeKind;
    use basalt_storage::{RecordBuffer, TableMemAccess, TextRef};

    /// Builds a table of elements from (dist, size) pairs.
    fn elements(shape: &[(usize, usize)]) -> TableMemAccess {
        let mut buf = RecordBuffer::new();
        for (i, &(dist, size)) in shape.iter().enumerate() {
            buf.elem(dist, 1, 1, size, 0, false, i as u32);
        }
        let mut table = TableMemAccess::new();
        table.insert(0, buf.as_bytes()).unwrap();
        table
    }

    /// <a><b><c/></b><d/></a>
    fn sample() -> TableMemAccess {
        elements(&[(1, 4), (1, 2), (1, 1), (3, 1)])
    }

    #[test]
    fn test_in_scope_and_shadowing() {
        let table = sample();
        let mut ns = Namespaces::new();
        ns.add(0, b"p", b"urn:a", &table).unwrap();
        ns.add(1, b"p", b"urn:b", &table).unwrap();
        ns.add(1, b"q", b"urn:q", &table).unwrap();

        assert_eq!(ns.uri_id_for_prefix(b"p", 2, &table).unwrap(), ns.uri_id(b"urn:b").unwrap());
        assert_eq!(ns.uri_id_for_prefix(b"p", 3, &table).unwrap(), ns.uri_id(b"urn:a").unwrap());
        assert_eq!(ns.uri_id_for_prefix(b"q", 3, &table).unwrap(), 0);
        assert_eq!(ns.uri_id_for_prefix(b"xml", 2, &table).unwrap(), 0);

        let visible = ns.visible(2, &table).unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible.contains(&(b"p".to_vec(), b"urn:b".to_vec())));
        assert!(visible.contains(&(b"q".to_vec(), b"urn:q".to_vec())));

        assert_eq!(ns.declared(1, &table).unwrap().len(), 2);
        assert!(ns.declared(2, &table).unwrap().is_empty());
        assert_eq!(ns.node_count(), 2);
    }

    #[test]
    fn test_add_adopts_descendants() {
        let table = sample();
        let mut ns = Namespaces::new();
        ns.add(2, b"c", b"urn:c", &table).unwrap();
        ns.add(3, b"d", b"urn:d", &table).unwrap();
        ns.add(0, b"a", b"urn:a", &table).unwrap();

        assert_eq!(ns.positions(), vec![0, 2, 3]);
        assert_eq!(ns.nodes[ROOT].children.len(), 1);
        assert_eq!(ns.uri_id_for_prefix(b"a", 2, &table).unwrap(), ns.uri_id(b"urn:a").unwrap());
    }

    #[test]
    fn test_undeclared_default_resolves_to_zero() {
        let table = sample();
        let mut ns = Namespaces::new();
        ns.add(0, b"", b"urn:default", &table).unwrap();
        ns.add(1, b"", b"", &table).unwrap();
        assert_ne!(ns.uri_id_for_prefix(b"", 3, &table).unwrap(), 0);
        assert_eq!(ns.uri_id_for_prefix(b"", 2, &table).unwrap(), 0);
    }

    #[test]
    fn test_delete_prunes_and_shifts() {
        let table = sample();
        let mut ns = Namespaces::new();
        ns.add(1, b"b", b"urn:b", &table).unwrap();
        ns.add(2, b"c", b"urn:c", &table).unwrap();
        ns.add(3, b"d", b"urn:d", &table).unwrap();

        ns.delete(1, 2);
        assert_eq!(ns.positions(), vec![1]);
        assert_eq!(ns.node_count(), 1);

        // slots are reused
        let mut buf = RecordBuffer::new();
        buf.elem(1, 1, 1, 2, 0, false, 0);
        buf.elem(1, 1, 1, 1, 0, false, 1);
        let mut small = TableMemAccess::new();
        small.insert(0, buf.as_bytes()).unwrap();
        ns.add(0, b"x", b"urn:x", &small).unwrap();
        assert_eq!(ns.nodes.len(), 4);
    }

    #[test]
    fn test_shift() {
        let table = sample();
        let mut ns = Namespaces::new();
        ns.add(1, b"b", b"urn:b", &table).unwrap();
        ns.add(3, b"d", b"urn:d", &table).unwrap();
        ns.shift(2, 5);
        assert_eq!(ns.positions(), vec![1, 8]);
        ns.shift(0, 0);
        assert_eq!(ns.positions(), vec![1, 8]);
    }

    #[test]
    fn test_write_read() {
        let table = sample();
        let mut ns = Namespaces::new();
        ns.add(0, b"a", b"urn:a", &table).unwrap();
        ns.add(1, b"b", b"urn:b", &table).unwrap();
        ns.add(3, b"d", b"urn:d", &table).unwrap();
        ns.add(3, b"", b"urn:default", &table).unwrap();

        let mut buf = BytesMut::new();
        ns.write(&mut buf);
        let mut input = &buf[..];
        let read = Namespaces::read(&mut input).unwrap();
        assert!(input.is_empty());
        assert_eq!(read.positions(), ns.positions());
        assert_eq!(read.declared(3, &table).unwrap(), ns.declared(3, &table).unwrap());
        assert_eq!(
            read.uri_id_for_prefix(b"b", 2, &table).unwrap(),
            ns.uri_id_for_prefix(b"b", 2, &table).unwrap()
        );
    }

    #[test]
    fn test_empty_write_read() {
        let ns = Namespaces::new();
        let mut buf = BytesMut::new();
        ns.write(&mut buf);
        let read = Namespaces::read(&mut &buf[..]).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn test_uri_limit() {
        let mut ns = Namespaces::new();
        for i in 0..MAX_URIS {
            ns.uri_index(format!("urn:{}", i).as_bytes()).unwrap();
        }
        assert!(matches!(
            ns.uri_index(b"urn:overflow"),
            Err(BasaltError::TooManyNamespaces { .. })
        ));
    }

    #[test]
    fn test_document_roots() {
        let mut buf = RecordBuffer::new();
        buf.doc(3, TextRef::inline(0), 0);
        buf.elem(1, 1, 1, 2, 0, false, 1);
        buf.text(NodeKind::Text, 1, TextRef::inline(1), 2);
        let mut table = TableMemAccess::new();
        table.insert(0, buf.as_bytes()).unwrap();

        let mut ns = Namespaces::new();
        ns.add(1, b"p", b"urn:p", &table).unwrap();
        assert!(ns.visible(0, &table).unwrap().is_empty());
        assert_eq!(ns.visible(2, &table).unwrap().len(), 1);
    }
}
