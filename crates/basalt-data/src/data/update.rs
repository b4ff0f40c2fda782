//! Structural and value updates.
//!
//! Insert, delete and replace keep sizes of ancestors and distances of
//! following nodes consistent, move namespace nodes along with the table,
//! and report changes to the registered hooks.

use super::{Data, MemData, StoreState};
use crate::namespaces::NsScope;
use crate::reader::DataClip;
use crate::tokens::{self, MAX_NAMES, XML_PREFIX};
use basalt_common::{BasaltError, NodeKind, Result, MAX_ATTS};
use basalt_storage::{record, RecordBuffer, TableAccess, TextStore};
use tracing::trace;

/// Records built for an insertion.
struct Built {
    buf: RecordBuffer,
    /// Positions of inserted documents.
    docs: Vec<usize>,
    first_id: u32,
    /// Number of attributes at the start of the batch.
    atts: usize,
}

impl<T: TableAccess, V: TextStore> Data<T, V> {
    /// Fails unless the store accepts updates.
    fn check_writable(&self) -> Result<()> {
        match self.state {
            StoreState::Closed => Err(BasaltError::Closed(self.meta.name.clone())),
            StoreState::Open if self.dir.is_some() => {
                Err(BasaltError::NotUpdating(self.meta.name.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Inserts the records of a clip at `pre` below `parent`.
    ///
    /// A `parent` of None inserts top-level nodes, such as documents.
    pub fn insert(&mut self, pre: usize, parent: Option<usize>, clip: &DataClip<'_>) -> Result<()> {
        self.check_writable()?;
        if clip.is_empty() {
            return Ok(());
        }
        let count = clip.size();
        self.meta.update();

        let mut scope = NsScope::new(pre, parent, &self.nspaces, &self.table)?;
        let built = self.build(pre, parent, clip, &mut scope)?;
        self.table.insert(pre, built.buf.as_bytes())?;
        self.meta.size = self.table.len();
        self.resize_ancestors(parent, count as isize)?;
        self.update_dist(pre + count, count as isize)?;
        scope.close(count, &mut self.nspaces, &mut self.table)?;

        if let Some(map) = &mut self.idmap {
            map.insert(pre, built.first_id, count);
        }
        self.resources.insert(pre, count, &built.docs);
        trace!(pre, count, fragments = clip.fragments, "inserted records");
        self.notify_insert(pre, count)
    }

    /// Inserts the attributes of a clip at `pre` into the element `parent`.
    pub fn insert_attr(&mut self, pre: usize, parent: usize, clip: &DataClip<'_>) -> Result<()> {
        self.check_writable()?;
        // one at a time, so that later attributes see bindings of earlier ones
        for i in 0..clip.size() {
            let single = DataClip {
                data: clip.data,
                start: clip.start + i,
                end: clip.start + i + 1,
                fragments: 1,
            };
            let atts = record::att_size(&self.table, parent, NodeKind::Element)?;
            self.insert(pre + i, Some(parent), &single)?;
            record::set_att_size(&mut self.table, parent, NodeKind::Element, atts + 1)?;
        }
        Ok(())
    }

    /// Deletes the subtree at `pre`.
    pub fn delete(&mut self, pre: usize) -> Result<()> {
        self.check_writable()?;
        let kind = self.kind(pre)?;
        let size = record::size(&self.table, pre, kind)?;
        let parent = self.parent_of(pre, kind)?;
        self.meta.update();

        self.notify_delete(pre, size)?;
        self.resources.delete(pre, size);
        self.free_texts(pre, size)?;
        if kind == NodeKind::Document {
            self.meta.ndocs = self.meta.ndocs.saturating_sub(1);
        }
        if kind == NodeKind::Attribute {
            if let Some(parent) = parent {
                let atts = record::att_size(&self.table, parent, NodeKind::Element)?;
                record::set_att_size(&mut self.table, parent, NodeKind::Element, atts - 1)?;
            }
        }
        self.nspaces.delete(pre, size);
        self.resize_ancestors(parent, -(size as isize))?;
        if let Some(map) = &mut self.idmap {
            map.delete(pre, size);
        }
        self.table.delete(pre, size)?;
        self.meta.size = self.table.len();
        self.update_dist(pre, -(size as isize))?;
        trace!(pre, size, "deleted subtree");
        Ok(())
    }

    /// Replaces the subtree at `pre` with the records of a clip.
    pub fn replace(&mut self, pre: usize, clip: &DataClip<'_>) -> Result<()> {
        self.check_writable()?;
        if clip.is_empty() {
            return self.delete(pre);
        }
        let kind = self.kind(pre)?;
        let old = record::size(&self.table, pre, kind)?;
        let parent = self.parent_of(pre, kind)?;
        let count = clip.size();
        self.meta.update();

        self.notify_delete(pre, old)?;
        let old_atts = usize::from(kind == NodeKind::Attribute);
        let parent_atts = match parent {
            Some(p) => Some(record::att_size(&self.table, p, self.kind(p)?)?),
            None => None,
        };
        let mut scope = NsScope::new(pre, parent, &self.nspaces, &self.table)?;
        self.resources.delete(pre, old);
        self.free_texts(pre, old)?;
        if kind == NodeKind::Document {
            self.meta.ndocs = self.meta.ndocs.saturating_sub(1);
        }
        self.nspaces.delete(pre, old);
        if let Some(map) = &mut self.idmap {
            map.delete(pre, old);
        }

        let built = self.build(pre, parent, clip, &mut scope)?;
        self.table.replace(pre, built.buf.as_bytes(), old)?;
        self.meta.size = self.table.len();
        let diff = count as isize - old as isize;
        self.resize_ancestors(parent, diff)?;
        if diff != 0 {
            self.update_dist(pre + count, diff)?;
        }
        if let (Some(p), Some(atts)) = (parent, parent_atts) {
            if built.atts != old_atts {
                let k = self.kind(p)?;
                record::set_att_size(&mut self.table, p, k, atts + built.atts - old_atts)?;
            }
        }
        scope.close(count, &mut self.nspaces, &mut self.table)?;

        if let Some(map) = &mut self.idmap {
            map.insert(pre, built.first_id, count);
        }
        self.resources.insert(pre, count, &built.docs);
        trace!(pre, old, count, "replaced subtree");
        self.notify_insert(pre, count)
    }

    /// Renames an element, attribute or processing instruction, or a
    /// document.
    ///
    /// A uri that is not bound to the prefix at the node is declared at the
    /// element owning the name.
    pub fn rename(&mut self, pre: usize, name: &[u8], uri: &[u8]) -> Result<()> {
        self.check_writable()?;
        let kind = self.kind(pre)?;
        match kind {
            NodeKind::ProcessingInstruction => {
                let body = self.atom(pre)?;
                let text = pi_text(name, &body);
                self.meta.update();
                return self.write_text(pre, kind, &text);
            }
            NodeKind::Document => {
                self.meta.update();
                return self.write_text(pre, kind, name);
            }
            NodeKind::Element | NodeKind::Attribute => {}
            _ => return Ok(()),
        }
        self.meta.update();
        self.notify_delete(pre, 1)?;

        let prefix = tokens::prefix(name);
        let uri_id = if uri.is_empty() || prefix == XML_PREFIX {
            0
        } else {
            let owner = if kind == NodeKind::Attribute {
                self.parent_of(pre, kind)?
            } else {
                Some(pre)
            };
            let visible = self.nspaces.uri_id_for_prefix(prefix, pre, &self.table)?;
            match owner {
                _ if visible != 0 && self.nspaces.uri(visible) == uri => visible,
                Some(owner) => {
                    let id = self.nspaces.add(owner, prefix, uri, &self.table)?;
                    record::set_ns_flag(&mut self.table, owner, true)?;
                    id
                }
                None => self.nspaces.uri_index(uri)?,
            }
        };
        let names = if kind == NodeKind::Element {
            &mut self.elem_names
        } else {
            &mut self.attr_names
        };
        let name_id = names
            .index(name)
            .ok_or(BasaltError::TooManyNames { max: MAX_NAMES })?;
        record::set_name_id(&mut self.table, pre, name_id as u16)?;
        record::set_uri_id(&mut self.table, pre, kind, uri_id as u8)?;
        self.notify_insert(pre, 1)
    }

    /// Replaces the value of a text, comment, attribute or processing
    /// instruction, or the name of a document.
    pub fn update_value(&mut self, pre: usize, value: &[u8]) -> Result<()> {
        self.check_writable()?;
        let kind = self.kind(pre)?;
        if kind == NodeKind::Element {
            return Ok(());
        }
        let text = if kind == NodeKind::ProcessingInstruction {
            pi_text(&self.name(pre)?, value)
        } else {
            value.to_vec()
        };
        if self.text(pre)? == text {
            return Ok(());
        }
        self.meta.update();
        self.write_text(pre, kind, &text)
    }

    /// Copies the subtrees in `[start, end)` into a new memory store.
    pub fn copy(&self, start: usize, end: usize) -> Result<MemData> {
        let mut data = MemData::new(&self.meta.name, &self.options, self.store_id);
        let clip = DataClip::new(self, start, end)?;
        data.insert(0, None, &clip)?;
        Ok(data)
    }

    /// Stores a new text for a node, reporting the change to the hooks.
    fn write_text(&mut self, pre: usize, kind: NodeKind, text: &[u8]) -> Result<()> {
        self.notify_delete(pre, 1)?;
        let old = record::text_ref(&self.table, pre)?;
        let new = self.store_of_mut(kind).replace(old, text)?;
        record::set_text_ref(&mut self.table, pre, new)?;
        self.notify_insert(pre, 1)
    }

    /// Builds the records of a clip for insertion at `pre` below `parent`.
    fn build(
        &mut self,
        pre: usize,
        parent: Option<usize>,
        clip: &DataClip<'_>,
        scope: &mut NsScope,
    ) -> Result<Built> {
        let src = clip.data;
        let mut buf = RecordBuffer::with_capacity(clip.size());
        let mut docs = Vec::new();
        let first_id = self.meta.peek_id();
        let mut atts = 0;
        let mut leading = true;
        let mut next_top = clip.start;

        for spre in clip.start..clip.end {
            let index = spre - clip.start;
            let npre = pre + index;
            let kind = src.node_kind(spre)?;
            let top = spre == next_top;
            let dist = if top {
                next_top += src.node_size(spre)?;
                match parent {
                    Some(p) => npre - p,
                    None => npre + 1,
                }
            } else {
                src.node_dist(spre)?
            };
            if top {
                leading = leading && kind == NodeKind::Attribute;
                if leading {
                    atts += 1;
                }
            }
            let owner = npre.checked_sub(dist);
            let id = self.meta.next_id()?;
            scope.enter(owner);

            match kind {
                NodeKind::Document => {
                    let text = self.texts.store(&src.node_text(spre)?)?;
                    buf.doc(src.node_size(spre)?, text, id);
                    docs.push(npre);
                    self.meta.ndocs += 1;
                }
                NodeKind::Element => {
                    let decls = if top {
                        src.ns_in_scope(spre)?
                    } else {
                        src.ns_declared(spre)?
                    };
                    scope.open(npre, index, &decls, &mut self.nspaces)?;
                    let name = src.node_name(spre)?;
                    let uri = src.node_uri(spre)?;
                    let uri_id = self.resolve(scope, &mut buf, Some(npre), &name, &uri)?;
                    let name_id = self
                        .elem_names
                        .index(&name)
                        .ok_or(BasaltError::TooManyNames { max: MAX_NAMES })?;
                    buf.elem(
                        dist,
                        name_id as u16,
                        src.node_att_size(spre)?,
                        src.node_size(spre)?,
                        uri_id,
                        scope.declares(npre),
                        id,
                    );
                }
                NodeKind::Attribute => {
                    let name = src.node_name(spre)?;
                    let uri = src.node_uri(spre)?;
                    let uri_id = self.resolve(scope, &mut buf, owner, &name, &uri)?;
                    let name_id = self
                        .attr_names
                        .index(&name)
                        .ok_or(BasaltError::TooManyNames { max: MAX_NAMES })?;
                    let value = self.values.store(&src.node_text(spre)?)?;
                    buf.attr(dist, name_id as u16, value, uri_id, id);
                }
                _ => {
                    let text = self.texts.store(&src.node_text(spre)?)?;
                    buf.text(kind, dist, text, id);
                }
            }
        }
        Ok(Built {
            buf,
            docs,
            first_id,
            atts,
        })
    }

    /// Returns the uri id of a name in this store, binding the uri at
    /// `owner` if it is not visible.
    fn resolve(
        &mut self,
        scope: &mut NsScope,
        buf: &mut RecordBuffer,
        owner: Option<usize>,
        name: &[u8],
        uri: &[u8],
    ) -> Result<u8> {
        let prefix = tokens::prefix(name);
        if uri.is_empty() || prefix == XML_PREFIX {
            return Ok(0);
        }
        let prefix_id = self.nspaces.prefix_index(prefix)?;
        let uri_id = self.nspaces.uri_index(uri)?;
        if scope.lookup(prefix_id) != Some(uri_id) {
            if let Some(owner) = owner {
                if let Some(index) = scope.bind(owner, prefix_id, uri_id) {
                    buf.set_ns_flag(index);
                }
            }
        }
        Ok(uri_id as u8)
    }

    /// Adds `delta` to the sizes of `parent` and its ancestors.
    fn resize_ancestors(&mut self, parent: Option<usize>, delta: isize) -> Result<()> {
        let mut next = parent;
        while let Some(p) = next {
            let kind = self.kind(p)?;
            let size = record::size(&self.table, p, kind)?;
            record::set_size(&mut self.table, p, kind, (size as isize + delta) as usize)?;
            next = self.parent_of(p, kind)?;
        }
        Ok(())
    }

    /// Adds `delta` to the distances of the node at `from`, its following
    /// siblings and the following siblings of its ancestors, up to the next
    /// document.
    fn update_dist(&mut self, from: usize, delta: isize) -> Result<()> {
        let mut p = from;
        while p < self.table.len() {
            let kind = self.kind(p)?;
            if kind == NodeKind::Document {
                break;
            }
            let narrow = usize::from(self.table.read1(p, 0)? >> 3);
            let dist = if kind == NodeKind::Attribute && narrow >= MAX_ATTS {
                self.attribute_dist(p)?
            } else {
                (record::dist(&self.table, p, kind)? as isize + delta) as usize
            };
            record::set_dist(&mut self.table, p, kind, dist)?;
            p += record::size(&self.table, p, kind)?;
        }
        Ok(())
    }

    /// Counts the distance of an attribute to its element.
    fn attribute_dist(&self, pre: usize) -> Result<usize> {
        let mut dist = 1;
        while dist < pre && self.kind(pre - dist)? == NodeKind::Attribute {
            dist += 1;
        }
        Ok(dist)
    }

    /// Releases the texts of the records in `[pre, pre + size)`.
    fn free_texts(&mut self, pre: usize, size: usize) -> Result<()> {
        for p in pre..pre + size {
            let kind = self.kind(p)?;
            if kind.has_text() {
                let r = record::text_ref(&self.table, p)?;
                self.store_of_mut(kind).free(r)?;
            }
        }
        Ok(())
    }

    fn notify_delete(&mut self, pre: usize, size: usize) -> Result<()> {
        if self.hooks.is_empty() {
            return Ok(());
        }
        let id = self.id(pre)?;
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = hooks
            .iter_mut()
            .try_for_each(|hook| hook.on_delete(&*self, pre, id, size));
        self.hooks = hooks;
        result
    }

    fn notify_insert(&mut self, pre: usize, size: usize) -> Result<()> {
        if self.hooks.is_empty() {
            return Ok(());
        }
        let id = self.id(pre)?;
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = hooks
            .iter_mut()
            .try_for_each(|hook| hook.on_insert(&*self, pre, id, size));
        self.hooks = hooks;
        result
    }
}

/// Joins a processing-instruction target and body.
fn pi_text(target: &[u8], body: &[u8]) -> Vec<u8> {
    let mut text = target.to_vec();
    let body = trim(body);
    if !body.is_empty() {
        text.push(b' ');
        text.extend_from_slice(body);
    }
    text
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
