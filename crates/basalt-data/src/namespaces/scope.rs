//! Namespace scope of a batch of records being built.

use super::Namespaces;
use basalt_common::Result;
use basalt_storage::{record, TableAccess};

/// Element of the batch that declares namespaces.
#[derive(Debug)]
struct Entry {
    /// Final position of the element.
    pre: usize,
    /// Index of the element record in the batch.
    index: usize,
    bindings: Vec<(u32, u32)>,
}

/// Tracks the bindings visible while records for `[at, at + count)` are
/// built, before they are spliced into the table.
///
/// New declarations are collected and attached to the namespace tree by
/// [`NsScope::close`], once the table has its final shape.
#[derive(Debug)]
pub struct NsScope {
    at: usize,
    /// Bindings visible at the parent of the batch.
    base: Vec<(u32, u32)>,
    /// Open elements of the batch, outermost first.
    stack: Vec<Entry>,
    /// Closed elements with bindings.
    done: Vec<Entry>,
    /// Bindings added to existing elements outside the batch.
    owners: Vec<(usize, u32, u32)>,
}

impl NsScope {
    /// Creates a scope for records inserted at `at` below `parent`.
    pub fn new<T: TableAccess + ?Sized>(
        at: usize,
        parent: Option<usize>,
        nspaces: &Namespaces,
        table: &T,
    ) -> Result<Self> {
        let mut scope = Self::empty(at);
        if let Some(parent) = parent {
            scope.base = nspaces.in_scope(parent, table)?;
        }
        Ok(scope)
    }

    /// Creates a scope without visible bindings.
    pub fn empty(at: usize) -> Self {
        Self {
            at,
            base: Vec::new(),
            stack: Vec::new(),
            done: Vec::new(),
            owners: Vec::new(),
        }
    }

    /// Closes the open elements that are not ancestors of a node whose
    /// parent is `parent`.
    pub fn enter(&mut self, parent: Option<usize>) {
        while let Some(top) = self.stack.last() {
            if Some(top.pre) == parent {
                break;
            }
            if let Some(entry) = self.stack.pop() {
                if !entry.bindings.is_empty() {
                    self.done.push(entry);
                }
            }
        }
    }

    /// Opens an element with its declarations and returns true if any of
    /// them is not already visible.
    pub fn open(
        &mut self,
        pre: usize,
        index: usize,
        decls: &[(Vec<u8>, Vec<u8>)],
        nspaces: &mut Namespaces,
    ) -> Result<bool> {
        let mut bindings = Vec::new();
        for (prefix, uri) in decls {
            let prefix = nspaces.prefix_index(prefix)?;
            let uri = nspaces.uri_index(uri)?;
            if self.lookup(prefix) != Some(uri) {
                bindings.push((prefix, uri));
            }
        }
        let declares = !bindings.is_empty();
        self.stack.push(Entry {
            pre,
            index,
            bindings,
        });
        Ok(declares)
    }

    /// Returns the uri id bound to a prefix id.
    pub fn lookup(&self, prefix: u32) -> Option<u32> {
        let find = |bindings: &[(u32, u32)]| {
            bindings
                .iter()
                .find(|&&(p, _)| p == prefix)
                .map(|&(_, u)| u)
        };
        self.stack
            .iter()
            .rev()
            .find_map(|entry| find(&entry.bindings))
            .or_else(|| {
                self.owners
                    .iter()
                    .rev()
                    .find(|&&(_, p, _)| p == prefix)
                    .map(|&(_, _, u)| u)
            })
            .or_else(|| find(&self.base))
    }

    /// Binds a prefix at `owner`.
    ///
    /// Returns the batch index of the owner if it is part of the batch, so
    /// the caller can set its namespace flag.
    pub fn bind(&mut self, owner: usize, prefix: u32, uri: u32) -> Option<usize> {
        match self.stack.iter_mut().rev().find(|e| e.pre == owner) {
            Some(entry) => {
                entry.bindings.push((prefix, uri));
                Some(entry.index)
            }
            None => {
                self.owners.push((owner, prefix, uri));
                None
            }
        }
    }

    /// Returns true if the open element at `pre` declares namespaces.
    pub fn declares(&self, pre: usize) -> bool {
        self.stack
            .iter()
            .rev()
            .any(|e| e.pre == pre && !e.bindings.is_empty())
    }

    /// Attaches the collected declarations after `count` records were
    /// spliced in at the start position.
    pub fn close<T: TableAccess + ?Sized>(
        mut self,
        count: usize,
        nspaces: &mut Namespaces,
        table: &mut T,
    ) -> Result<()> {
        self.enter(None);
        nspaces.shift(self.at, count as isize);
        self.done.sort_by_key(|e| e.pre);
        for entry in &self.done {
            nspaces.add_node(entry.pre, &entry.bindings, table)?;
        }
        for &(owner, prefix, uri) in &self.owners {
            nspaces.add_node(owner, &[(prefix, uri)], table)?;
            record::set_ns_flag(table, owner, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_storage::{RecordBuffer, TableMemAccess};

    fn decl(prefix: &str, uri: &str) -> (Vec<u8>, Vec<u8>) {
        (prefix.as_bytes().to_vec(), uri.as_bytes().to_vec())
    }

    /// <r xmlns:p="urn:p"><x/></r>
    fn target() -> (TableMemAccess, Namespaces) {
        let mut buf = RecordBuffer::new();
        buf.elem(1, 1, 1, 2, 0, true, 0);
        buf.elem(1, 2, 1, 1, 0, false, 1);
        let mut table = TableMemAccess::new();
        table.insert(0, buf.as_bytes()).unwrap();
        let mut ns = Namespaces::new();
        ns.add(0, b"p", b"urn:p", &table).unwrap();
        (table, ns)
    }

    #[test]
    fn test_visible_declarations_are_skipped() {
        let (table, mut ns) = target();
        let mut scope = NsScope::new(2, Some(0), &ns, &table).unwrap();
        scope.enter(Some(0));
        let declares = scope
            .open(2, 0, &[decl("p", "urn:p")], &mut ns)
            .unwrap();
        assert!(!declares);
        let declares = scope
            .open(3, 1, &[decl("p", "urn:other")], &mut ns)
            .unwrap();
        assert!(declares);
        assert!(scope.declares(3));
        assert!(!scope.declares(2));
    }

    #[test]
    fn test_close_attaches_new_nodes() {
        let (mut table, mut ns) = target();
        let mut scope = NsScope::new(1, Some(0), &ns, &table).unwrap();
        scope.enter(Some(0));
        assert!(scope.open(1, 0, &[decl("q", "urn:q")], &mut ns).unwrap());

        // splice <y xmlns:q="urn:q"/> before <x/>
        let mut buf = RecordBuffer::new();
        buf.elem(1, 3, 1, 1, 0, true, 2);
        table.insert(1, buf.as_bytes()).unwrap();
        record::set_size(&mut table, 0, basalt_common::NodeKind::Element, 3).unwrap();
        record::set_dist(&mut table, 2, basalt_common::NodeKind::Element, 2).unwrap();

        scope.close(1, &mut ns, &mut table).unwrap();
        assert_eq!(ns.positions(), vec![0, 1]);
        let q = ns.uri_id(b"urn:q").unwrap();
        assert_eq!(ns.uri_id_for_prefix(b"q", 1, &table).unwrap(), q);
        assert_eq!(ns.uri_id_for_prefix(b"q", 2, &table).unwrap(), 0);
    }

    #[test]
    fn test_bind_existing_owner() {
        let (mut table, mut ns) = target();
        let mut scope = NsScope::new(1, Some(1), &ns, &table).unwrap();
        let prefix = ns.prefix_index(b"z").unwrap();
        let uri = ns.uri_index(b"urn:z").unwrap();
        assert_eq!(scope.lookup(prefix), None);
        assert_eq!(scope.bind(1, prefix, uri), None);
        assert_eq!(scope.lookup(prefix), Some(uri));

        scope.close(0, &mut ns, &mut table).unwrap();
        assert!(record::ns_flag(&table, 1).unwrap());
        assert_eq!(ns.uri_id_for_prefix(b"z", 1, &table).unwrap(), uri);
    }

    #[test]
    fn test_bind_inside_batch() {
        let (table, mut ns) = target();
        let mut scope = NsScope::new(2, None, &ns, &table).unwrap();
        scope.open(2, 0, &[], &mut ns).unwrap();
        scope.enter(Some(2));
        scope.open(3, 1, &[], &mut ns).unwrap();
        let prefix = ns.prefix_index(b"a").unwrap();
        let uri = ns.uri_index(b"urn:a").unwrap();
        assert_eq!(scope.bind(2, prefix, uri), Some(0));
        assert_eq!(scope.lookup(prefix), Some(uri));
        scope.enter(None);
        assert_eq!(scope.lookup(prefix), None);
    }
}
