//! Event-driven construction of memory stores.

use crate::data::MemData;
use crate::namespaces::NsScope;
use crate::tokens::{self, MAX_NAMES, XML_PREFIX};
use basalt_common::{BasaltError, NodeKind, Result, StoreConfig};
use basalt_storage::{record, RecordBuffer, TableAccess, TextStore};
use tracing::debug;

/// Builds a memory store from parser events.
///
/// Nodes are appended in document order. Elements and documents are closed
/// explicitly; their sizes are patched when they end. Prefixes of element
/// and attribute names must be declared by the element or an ancestor.
pub struct Builder {
    data: MemData,
    /// Open documents and elements.
    stack: Vec<usize>,
    scope: NsScope,
}

impl Builder {
    /// Creates a builder for a store with the given name.
    pub fn new(name: &str, config: &StoreConfig) -> Self {
        Self::with_store_id(name, config, 0)
    }

    /// Creates a builder whose store gets the given instance id.
    pub fn with_store_id(name: &str, config: &StoreConfig, store_id: u64) -> Self {
        Self {
            data: MemData::new(name, config, store_id),
            stack: Vec::new(),
            scope: NsScope::empty(0),
        }
    }

    fn parent(&self) -> Option<usize> {
        self.stack.last().copied()
    }

    fn dist(&self, pre: usize) -> usize {
        match self.parent() {
            Some(parent) => pre - parent,
            None => pre + 1,
        }
    }

    fn append(&mut self, buf: &RecordBuffer) -> Result<()> {
        let end = self.data.table.len();
        self.data.table.insert(end, buf.as_bytes())
    }

    /// Opens a document node.
    pub fn start_doc(&mut self, name: &str) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(BasaltError::InvalidBuild(format!(
                "document '{}' inside another node",
                name
            )));
        }
        let pre = self.data.table.len();
        let id = self.data.meta.next_id()?;
        let text = self.data.texts.store(name.as_bytes())?;
        let mut buf = RecordBuffer::with_capacity(1);
        buf.doc(1, text, id);
        self.append(&buf)?;
        self.stack.push(pre);
        self.data.meta.ndocs += 1;
        Ok(())
    }

    /// Closes the current document node.
    pub fn end_doc(&mut self) -> Result<()> {
        self.close(NodeKind::Document)
    }

    /// Opens an element with its attributes and namespace declarations.
    pub fn start_elem(
        &mut self,
        name: &str,
        atts: &[(&str, &str)],
        ns: &[(&str, &str)],
    ) -> Result<()> {
        let pre = self.data.table.len();
        let dist = self.dist(pre);
        let parent = self.parent();
        self.scope.enter(parent);
        let decls: Vec<(Vec<u8>, Vec<u8>)> = ns
            .iter()
            .map(|(p, u)| (p.as_bytes().to_vec(), u.as_bytes().to_vec()))
            .collect();
        let declares = self.scope.open(pre, 0, &decls, &mut self.data.nspaces)?;

        let uri = self.resolve(name.as_bytes(), true)?;
        let name_id = self
            .data
            .elem_names
            .index(name.as_bytes())
            .ok_or(BasaltError::TooManyNames { max: MAX_NAMES })?;
        let id = self.data.meta.next_id()?;
        let mut buf = RecordBuffer::with_capacity(atts.len() + 1);
        buf.elem(dist, name_id as u16, atts.len() + 1, atts.len() + 1, uri, declares, id);

        for (i, (att, value)) in atts.iter().enumerate() {
            let uri = self.resolve(att.as_bytes(), false)?;
            let name_id = self
                .data
                .attr_names
                .index(att.as_bytes())
                .ok_or(BasaltError::TooManyNames { max: MAX_NAMES })?;
            let value = self.data.values.store(value.as_bytes())?;
            let id = self.data.meta.next_id()?;
            buf.attr(i + 1, name_id as u16, value, uri, id);
        }
        self.append(&buf)?;
        self.stack.push(pre);
        Ok(())
    }

    /// Closes the current element.
    pub fn end_elem(&mut self) -> Result<()> {
        self.close(NodeKind::Element)
    }

    fn close(&mut self, kind: NodeKind) -> Result<()> {
        let pre = self
            .stack
            .pop()
            .ok_or_else(|| BasaltError::InvalidBuild(format!("no open {}", kind)))?;
        let open = self.data.kind(pre)?;
        if open != kind {
            return Err(BasaltError::InvalidBuild(format!(
                "{} closed while {} is open",
                kind, open
            )));
        }
        let size = self.data.table.len() - pre;
        record::set_size(&mut self.data.table, pre, kind, size)
    }

    /// Adds a text node. Whitespace-only texts are dropped when chopping.
    pub fn text(&mut self, value: &str) -> Result<()> {
        if value.is_empty() || (self.data.meta.chop && value.trim().is_empty()) {
            return Ok(());
        }
        self.leaf(NodeKind::Text, value.as_bytes())
    }

    /// Adds a comment.
    pub fn comment(&mut self, value: &str) -> Result<()> {
        self.leaf(NodeKind::Comment, value.as_bytes())
    }

    /// Adds a processing instruction.
    pub fn pi(&mut self, target: &str, body: &str) -> Result<()> {
        let body = body.trim();
        let text = if body.is_empty() {
            target.to_string()
        } else {
            format!("{} {}", target, body)
        };
        self.leaf(NodeKind::ProcessingInstruction, text.as_bytes())
    }

    fn leaf(&mut self, kind: NodeKind, value: &[u8]) -> Result<()> {
        let pre = self.data.table.len();
        let dist = self.dist(pre);
        let id = self.data.meta.next_id()?;
        let text = self.data.texts.store(value)?;
        let mut buf = RecordBuffer::with_capacity(1);
        buf.text(kind, dist, text, id);
        self.append(&buf)
    }

    /// Returns the uri id of a name, or fails if its prefix is unbound.
    fn resolve(&self, name: &[u8], element: bool) -> Result<u8> {
        let prefix = tokens::prefix(name);
        if prefix == XML_PREFIX || (prefix.is_empty() && !element) {
            return Ok(0);
        }
        let uri = self
            .data
            .nspaces
            .prefix_id(prefix)
            .and_then(|id| self.scope.lookup(id));
        match uri {
            Some(uri) if self.data.nspaces.uri(uri).is_empty() => Ok(0),
            Some(uri) => Ok(uri as u8),
            None if prefix.is_empty() => Ok(0),
            None => Err(BasaltError::UnboundPrefix(
                String::from_utf8_lossy(prefix).into_owned(),
            )),
        }
    }

    /// Finishes the store.
    pub fn finish(self) -> Result<MemData> {
        let Self {
            mut data,
            stack,
            scope,
        } = self;
        if !stack.is_empty() {
            return Err(BasaltError::InvalidBuild(format!(
                "{} unclosed nodes",
                stack.len()
            )));
        }
        scope.close(0, &mut data.nspaces, &mut data.table)?;
        data.meta.size = data.table.len();
        data.rebuild_maps();
        debug!(name = %data.meta.name, records = data.meta.size, "Built store");
        Ok(data)
    }
}
