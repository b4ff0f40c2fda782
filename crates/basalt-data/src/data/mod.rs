//! The document store.
//!
//! A store is a flat table of node records in document order plus the
//! text stores, the name dictionaries and the namespace structure. Nodes
//! are addressed by their position (pre value). One implementation of the
//! read and update algorithms serves both memory and disk backends.

mod lifecycle;
mod update;

use crate::hooks::{Resources, UpdateHook};
use crate::idmap::IdPreMap;
use crate::meta::MetaData;
use crate::namespaces::Namespaces;
use crate::reader::{Bindings, NodeReader};
use crate::tokens::{self, TokenSet, MAX_NAMES, XML_PREFIX, XML_URI};
use basalt_common::{NodeKind, Result, StoreConfig};
use basalt_storage::{
    record, DiskValues, MemValues, TableAccess, TableDiskAccess, TableMemAccess, TextStore,
};
use std::ops::Range;
use std::path::PathBuf;

/// Session state of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Readable; disk stores reject updates.
    Open,
    /// Inside an update session.
    Updating,
    /// Closed; every operation fails.
    Closed,
}

/// Store held in memory.
pub type MemData = Data<TableMemAccess, MemValues>;

/// Store persisted in a directory.
pub type DiskData = Data<TableDiskAccess, DiskValues>;

/// Document store over a table and two text stores.
pub struct Data<T: TableAccess, V: TextStore> {
    pub(crate) meta: MetaData,
    pub(crate) table: T,
    /// Texts, comments, processing instructions and document names.
    pub(crate) texts: V,
    /// Attribute values.
    pub(crate) values: V,
    pub(crate) elem_names: TokenSet,
    pub(crate) attr_names: TokenSet,
    pub(crate) nspaces: Namespaces,
    /// Id to pre mapping, kept when live index updates are enabled.
    pub(crate) idmap: Option<IdPreMap>,
    pub(crate) resources: Resources,
    hooks: Vec<Box<dyn UpdateHook>>,
    pub(crate) state: StoreState,
    /// Store directory of disk stores.
    dir: Option<PathBuf>,
    options: StoreConfig,
    store_id: u64,
}

impl MemData {
    /// Creates an empty memory store.
    pub fn new(name: &str, config: &StoreConfig, store_id: u64) -> Self {
        let meta = MetaData::new(name, config);
        Data::from_parts(
            meta,
            TableMemAccess::new(),
            MemValues::new(),
            MemValues::new(),
            TokenSet::new(MAX_NAMES),
            TokenSet::new(MAX_NAMES),
            Namespaces::new(),
            None,
            config.clone(),
            store_id,
        )
    }
}

impl<T: TableAccess, V: TextStore> Data<T, V> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        meta: MetaData,
        table: T,
        texts: V,
        values: V,
        elem_names: TokenSet,
        attr_names: TokenSet,
        nspaces: Namespaces,
        dir: Option<PathBuf>,
        options: StoreConfig,
        store_id: u64,
    ) -> Self {
        let mut data = Self {
            meta,
            table,
            texts,
            values,
            elem_names,
            attr_names,
            nspaces,
            idmap: None,
            resources: Resources::default(),
            hooks: Vec::new(),
            state: StoreState::Open,
            dir,
            options,
            store_id,
        };
        data.rebuild_maps();
        data
    }

    /// Recomputes the document list and the id map from the table.
    pub(crate) fn rebuild_maps(&mut self) {
        let mut docs = Vec::new();
        let mut pre = 0;
        while pre < self.table.len() {
            match record::kind(&self.table, pre).and_then(|k| {
                if k == NodeKind::Document {
                    docs.push(pre);
                }
                record::size(&self.table, pre, k)
            }) {
                Ok(size) => pre += size.max(1),
                Err(_) => break,
            }
        }
        self.resources = Resources::new(docs);
        self.idmap = if self.meta.update_index {
            let ids = (0..self.table.len()).filter_map(|pre| record::id(&self.table, pre).ok());
            Some(IdPreMap::from_ids(ids))
        } else {
            None
        };
    }

    /// Returns the metadata.
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// Returns the store name.
    pub fn db_name(&self) -> &str {
        &self.meta.name
    }

    /// Returns the id of this store instance within its context.
    pub fn store_id(&self) -> u64 {
        self.store_id
    }

    /// Returns the session state.
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Returns the store directory of a disk store.
    pub fn dir(&self) -> Option<&std::path::Path> {
        self.dir.as_deref()
    }

    /// Returns the element name dictionary.
    pub fn elem_names(&self) -> &TokenSet {
        &self.elem_names
    }

    /// Returns the attribute name dictionary.
    pub fn attr_names(&self) -> &TokenSet {
        &self.attr_names
    }

    /// Returns the namespace structure.
    pub fn nspaces(&self) -> &Namespaces {
        &self.nspaces
    }

    /// Registers an update hook.
    pub fn add_hook(&mut self, hook: Box<dyn UpdateHook>) {
        self.hooks.push(hook);
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the kind of a node.
    pub fn kind(&self, pre: usize) -> Result<NodeKind> {
        record::kind(&self.table, pre)
    }

    /// Returns the number of records of the subtree at `pre`.
    pub fn size(&self, pre: usize) -> Result<usize> {
        record::size(&self.table, pre, self.kind(pre)?)
    }

    /// Returns the distance of a node to its parent.
    pub fn dist(&self, pre: usize) -> Result<usize> {
        record::dist(&self.table, pre, self.kind(pre)?)
    }

    /// Returns the parent of a node, or None for documents and top-level
    /// fragment nodes.
    pub fn parent(&self, pre: usize) -> Result<Option<usize>> {
        self.parent_of(pre, self.kind(pre)?)
    }

    pub(crate) fn parent_of(&self, pre: usize, kind: NodeKind) -> Result<Option<usize>> {
        Ok(pre.checked_sub(record::dist(&self.table, pre, kind)?))
    }

    /// Returns 1 + the number of attributes of an element.
    pub fn att_size(&self, pre: usize) -> Result<usize> {
        record::att_size(&self.table, pre, self.kind(pre)?)
    }

    /// Returns the number of attributes of an element.
    pub fn attribute_count(&self, pre: usize) -> Result<usize> {
        Ok(self.att_size(pre)? - 1)
    }

    /// Returns the stable id of a node.
    pub fn id(&self, pre: usize) -> Result<u32> {
        record::id(&self.table, pre)
    }

    /// Returns the current position of a node id.
    ///
    /// Uses the id map if present and scans the table otherwise.
    pub fn pre(&self, id: u32) -> Result<Option<usize>> {
        if let Some(map) = &self.idmap {
            return Ok(map.pre(id));
        }
        // without deletions, pre values never exceed ids
        let len = self.table.len();
        let start = (id as usize).min(len);
        for pre in (start..len).chain(0..start) {
            if record::id(&self.table, pre)? == id {
                return Ok(Some(pre));
            }
        }
        Ok(None)
    }

    /// Returns the name id of an element or attribute.
    pub fn name_id(&self, pre: usize) -> Result<u16> {
        record::name_id(&self.table, pre)
    }

    /// Returns the uri id of an element or attribute.
    pub fn uri_id(&self, pre: usize) -> Result<u8> {
        record::uri_id(&self.table, pre, self.kind(pre)?)
    }

    /// Returns true if an element declares namespaces.
    pub fn ns_flag(&self, pre: usize) -> Result<bool> {
        Ok(self.kind(pre)? == NodeKind::Element && record::ns_flag(&self.table, pre)?)
    }

    /// Returns the name of an element or attribute, or the target of a
    /// processing instruction. Other kinds have no name.
    pub fn name(&self, pre: usize) -> Result<Vec<u8>> {
        match self.kind(pre)? {
            NodeKind::Element => Ok(self.elem_names.key(self.name_id(pre)? as u32).to_vec()),
            NodeKind::Attribute => Ok(self.attr_names.key(self.name_id(pre)? as u32).to_vec()),
            NodeKind::ProcessingInstruction => {
                let text = self.text(pre)?;
                Ok(split_pi(&text).0.to_vec())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Returns the namespace uri of an element or attribute.
    pub fn uri(&self, pre: usize) -> Result<Vec<u8>> {
        let kind = self.kind(pre)?;
        if !kind.has_name() {
            return Ok(Vec::new());
        }
        let id = record::uri_id(&self.table, pre, kind)?;
        if id != 0 {
            return Ok(self.nspaces.uri(id as u32).to_vec());
        }
        let name = self.name(pre)?;
        if tokens::prefix(&name) == XML_PREFIX {
            Ok(XML_URI.to_vec())
        } else {
            Ok(Vec::new())
        }
    }

    /// Returns the name and namespace uri of a node.
    pub fn qname(&self, pre: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        Ok((self.name(pre)?, self.uri(pre)?))
    }

    pub(crate) fn store_of(&self, kind: NodeKind) -> &V {
        if kind == NodeKind::Attribute {
            &self.values
        } else {
            &self.texts
        }
    }

    pub(crate) fn store_of_mut(&mut self, kind: NodeKind) -> &mut V {
        if kind == NodeKind::Attribute {
            &mut self.values
        } else {
            &mut self.texts
        }
    }

    /// Returns the stored text of a node: the document name, the attribute
    /// value, or the content of a text, comment or processing instruction.
    pub fn text(&self, pre: usize) -> Result<Vec<u8>> {
        let kind = self.kind(pre)?;
        if !kind.has_text() {
            return Ok(Vec::new());
        }
        self.store_of(kind).read(record::text_ref(&self.table, pre)?)
    }

    /// Returns the string value of a node.
    pub fn atom(&self, pre: usize) -> Result<Vec<u8>> {
        match self.kind(pre)? {
            NodeKind::Text | NodeKind::Comment | NodeKind::Attribute => self.text(pre),
            NodeKind::ProcessingInstruction => {
                let text = self.text(pre)?;
                Ok(split_pi(&text).1.to_vec())
            }
            kind => {
                let end = pre + record::size(&self.table, pre, kind)?;
                let mut out = Vec::new();
                let mut p = pre;
                while p < end {
                    let k = self.kind(p)?;
                    if k == NodeKind::Text {
                        out.extend_from_slice(&self.text(p)?);
                    }
                    p += record::att_size(&self.table, p, k)?;
                }
                Ok(out)
            }
        }
    }

    /// Returns the integer value of a text or attribute value, or None if
    /// it is not an integer.
    pub fn text_int(&self, pre: usize) -> Result<Option<i64>> {
        let kind = self.kind(pre)?;
        if !kind.has_text() {
            return Ok(None);
        }
        let r = record::text_ref(&self.table, pre)?;
        if let Some(n) = r.inline_value() {
            return Ok(Some(n as i64));
        }
        let text = self.store_of(kind).read(r)?;
        Ok(std::str::from_utf8(&text)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok()))
    }

    /// Returns the byte length of the stored text of a node.
    pub fn text_len(&self, pre: usize) -> Result<usize> {
        let kind = self.kind(pre)?;
        if !kind.has_text() {
            return Ok(0);
        }
        self.store_of(kind).length(record::text_ref(&self.table, pre)?)
    }

    /// Returns the namespaces declared by an element.
    pub fn namespaces(&self, pre: usize) -> Result<Bindings> {
        if !self.ns_flag(pre)? {
            return Ok(Vec::new());
        }
        self.nspaces.declared(pre, &self.table)
    }

    /// Returns the value of the attribute `name` of an element.
    pub fn att_value(&self, name: &[u8], pre: usize) -> Result<Option<Vec<u8>>> {
        let Some(id) = self.attr_names.id(name) else {
            return Ok(None);
        };
        for att in self.attributes(pre)? {
            if self.name_id(att)? as u32 == id {
                return Ok(Some(self.text(att)?));
            }
        }
        Ok(None)
    }

    /// Returns the positions of the document nodes.
    pub fn docs(&self) -> &[usize] {
        self.resources.docs()
    }

    /// Returns the positions of the attributes of an element.
    pub fn attributes(&self, pre: usize) -> Result<Range<usize>> {
        Ok(pre + 1..pre + self.att_size(pre)?)
    }

    /// Returns the positions of the children of a document or element.
    pub fn children(&self, pre: usize) -> Result<Vec<usize>> {
        let kind = self.kind(pre)?;
        let end = pre + record::size(&self.table, pre, kind)?;
        let mut children = Vec::new();
        let mut p = pre + record::att_size(&self.table, pre, kind)?;
        while p < end {
            children.push(p);
            p += self.size(p)?;
        }
        Ok(children)
    }
}

/// Splits a processing instruction text into target and body.
fn split_pi(text: &[u8]) -> (&[u8], &[u8]) {
    match text.iter().position(|&b| b == b' ') {
        Some(i) => (&text[..i], &text[i + 1..]),
        None => (text, &[]),
    }
}

impl<T: TableAccess, V: TextStore> NodeReader for Data<T, V> {
    fn node_count(&self) -> usize {
        self.len()
    }

    fn node_kind(&self, pre: usize) -> Result<NodeKind> {
        self.kind(pre)
    }

    fn node_size(&self, pre: usize) -> Result<usize> {
        self.size(pre)
    }

    fn node_dist(&self, pre: usize) -> Result<usize> {
        self.dist(pre)
    }

    fn node_att_size(&self, pre: usize) -> Result<usize> {
        self.att_size(pre)
    }

    fn node_id(&self, pre: usize) -> Result<u32> {
        self.id(pre)
    }

    fn node_name(&self, pre: usize) -> Result<Vec<u8>> {
        self.name(pre)
    }

    fn node_uri(&self, pre: usize) -> Result<Vec<u8>> {
        self.uri(pre)
    }

    fn node_text(&self, pre: usize) -> Result<Vec<u8>> {
        self.text(pre)
    }

    fn ns_declared(&self, pre: usize) -> Result<Bindings> {
        self.namespaces(pre)
    }

    fn ns_in_scope(&self, pre: usize) -> Result<Bindings> {
        if self.nspaces.is_empty() {
            return Ok(Vec::new());
        }
        self.nspaces.visible(pre, &self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    /// <doc.xml><r a="1" b="x"><!--c--><?app run fast?>text<e/>tail</r>
    fn sample() -> MemData {
        let mut b = Builder::new("sample", &StoreConfig::default());
        b.start_doc("doc.xml").unwrap();
        b.start_elem("r", &[("a", "1"), ("b", "x")], &[]).unwrap();
        b.comment("c").unwrap();
        b.pi("app", "run fast").unwrap();
        b.text("text").unwrap();
        b.start_elem("e", &[], &[]).unwrap();
        b.end_elem().unwrap();
        b.text("tail").unwrap();
        b.end_elem().unwrap();
        b.end_doc().unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_structure() {
        let data = sample();
        assert_eq!(data.len(), 9);
        assert_eq!(data.kind(0).unwrap(), NodeKind::Document);
        assert_eq!(data.size(0).unwrap(), 9);
        assert_eq!(data.parent(0).unwrap(), None);
        assert_eq!(data.size(1).unwrap(), 8);
        assert_eq!(data.attribute_count(1).unwrap(), 2);
        assert_eq!(data.attributes(1).unwrap(), 2..4);
        assert_eq!(data.children(1).unwrap(), vec![4, 5, 6, 7, 8]);
        assert_eq!(data.children(0).unwrap(), vec![1]);
        for pre in 2..9 {
            assert_eq!(data.parent(pre).unwrap(), Some(1));
        }
        assert_eq!(data.docs(), &[0]);
    }

    #[test]
    fn test_names_and_values() {
        let data = sample();
        assert_eq!(data.name(1).unwrap(), b"r");
        assert_eq!(data.name(2).unwrap(), b"a");
        assert_eq!(data.name(5).unwrap(), b"app");
        assert!(data.name(6).unwrap().is_empty());
        assert_eq!(data.text(0).unwrap(), b"doc.xml");
        assert_eq!(data.text(4).unwrap(), b"c");
        assert_eq!(data.atom(5).unwrap(), b"run fast");
        assert_eq!(data.atom(1).unwrap(), b"texttail");
        assert_eq!(data.atom(0).unwrap(), b"texttail");
        assert_eq!(data.att_value(b"b", 1).unwrap(), Some(b"x".to_vec()));
        assert_eq!(data.att_value(b"zz", 1).unwrap(), None);
        assert_eq!(data.att_value(b"a", 7).unwrap(), None);
    }

    #[test]
    fn test_text_int_and_len() {
        let data = sample();
        assert_eq!(data.text_int(2).unwrap(), Some(1));
        assert_eq!(data.text_int(3).unwrap(), None);
        assert_eq!(data.text_int(1).unwrap(), None);
        assert_eq!(data.text_len(6).unwrap(), 4);
        assert_eq!(data.text_len(2).unwrap(), 1);
        assert_eq!(data.text_len(1).unwrap(), 0);
    }

    #[test]
    fn test_pre_by_scan() {
        let data = sample();
        for pre in 0..data.len() {
            let id = data.id(pre).unwrap();
            assert_eq!(data.pre(id).unwrap(), Some(pre));
        }
        assert_eq!(data.pre(1000).unwrap(), None);
    }

    #[test]
    fn test_xml_prefix_uri() {
        let mut b = Builder::new("xml", &StoreConfig::default());
        b.start_elem("r", &[("xml:lang", "en")], &[]).unwrap();
        b.end_elem().unwrap();
        let data = b.finish().unwrap();
        assert_eq!(data.uri(1).unwrap(), XML_URI);
        assert_eq!(data.uri_id(1).unwrap(), 0);
        assert!(data.uri(0).unwrap().is_empty());
    }

    #[test]
    fn test_split_pi() {
        assert_eq!(split_pi(b"target body text"), (&b"target"[..], &b"body text"[..]));
        assert_eq!(split_pi(b"target"), (&b"target"[..], &b""[..]));
    }
}
