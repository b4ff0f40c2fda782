//! Node record codec.
//!
//! Every node occupies one 16-byte record. The kind in the low three bits of
//! byte 0 selects the layout of the remaining bytes:
//!
//! | Kind      | 0          | 1-2          | 3      | 3-7      | 4-7  | 8-11 | 11  | 12-15 |
//! |-----------|------------|--------------|--------|----------|------|------|-----|-------|
//! | document  | kind       | 0            |        | text ref |      | size |     | id    |
//! | element   | atts\|kind | nsflag\|name | uri    |          | dist | size |     | id    |
//! | text-like | kind       | 0            |        | text ref |      | dist |     | id    |
//! | attribute | dist\|kind | nsflag\|name |        | value    |      | 0    | uri | id    |
//!
//! The attribute size of elements (1 + number of attributes) and the
//! distance of attributes share bits 7-3 of byte 0. Values of [`MAX_ATTS`]
//! or more are stored as `MAX_ATTS` and recovered by scanning neighbouring
//! attribute records.
//!
//! Accessors trust the caller to pass the correct kind.

use crate::table::TableAccess;
use crate::text::TextRef;
use basalt_common::block::{MAX_ATTS, NODE_SIZE};
use basalt_common::{NodeKind, Result};
use bytes::{BufMut, BytesMut};

/// Namespace flag in the high bit of the name field.
const NS_FLAG: u16 = 0x8000;
/// Mask of the name id.
const NAME_MASK: u16 = 0x7FFF;

/// Returns the kind of a record.
#[inline]
pub fn kind<T: TableAccess + ?Sized>(table: &T, pre: usize) -> Result<NodeKind> {
    Ok(NodeKind::from_bits(table.read1(pre, 0)?))
}

/// Returns the stable node id.
#[inline]
pub fn id<T: TableAccess + ?Sized>(table: &T, pre: usize) -> Result<u32> {
    table.read4(pre, 12)
}

/// Sets the node id.
#[inline]
pub fn set_id<T: TableAccess + ?Sized>(table: &mut T, pre: usize, id: u32) -> Result<()> {
    table.write4(pre, 12, id)
}

/// Returns the number of records in the subtree at `pre`, including itself.
#[inline]
pub fn size<T: TableAccess + ?Sized>(table: &T, pre: usize, kind: NodeKind) -> Result<usize> {
    if kind.has_size() {
        Ok(table.read4(pre, 8)? as usize)
    } else {
        Ok(1)
    }
}

/// Sets the subtree size of a document or element.
#[inline]
pub fn set_size<T: TableAccess + ?Sized>(
    table: &mut T,
    pre: usize,
    kind: NodeKind,
    size: usize,
) -> Result<()> {
    if kind.has_size() {
        table.write4(pre, 8, size as u32)?;
    }
    Ok(())
}

/// Returns the distance to the parent.
///
/// Documents report `pre + 1`, which places their parent before the table.
pub fn dist<T: TableAccess + ?Sized>(table: &T, pre: usize, kind: NodeKind) -> Result<usize> {
    match kind {
        NodeKind::Document => Ok(pre + 1),
        NodeKind::Element => Ok(table.read4(pre, 4)? as usize),
        NodeKind::Attribute => {
            let mut d = (table.read1(pre, 0)? >> 3) as usize;
            if d >= MAX_ATTS {
                while d < pre && self::kind(table, pre - d)? == NodeKind::Attribute {
                    d += 1;
                }
            }
            Ok(d)
        }
        _ => Ok(table.read4(pre, 8)? as usize),
    }
}

/// Sets the distance to the parent.
pub fn set_dist<T: TableAccess + ?Sized>(
    table: &mut T,
    pre: usize,
    kind: NodeKind,
    dist: usize,
) -> Result<()> {
    match kind {
        NodeKind::Document => Ok(()),
        NodeKind::Element => table.write4(pre, 4, dist as u32),
        NodeKind::Attribute => table.write1(pre, 0, narrow(dist) | NodeKind::Attribute.code()),
        _ => table.write4(pre, 8, dist as u32),
    }
}

/// Returns the attribute size: 1 + the number of attributes of an element,
/// or 1 for every other kind.
pub fn att_size<T: TableAccess + ?Sized>(table: &T, pre: usize, kind: NodeKind) -> Result<usize> {
    if kind != NodeKind::Element {
        return Ok(1);
    }
    let mut s = (table.read1(pre, 0)? >> 3) as usize;
    if s >= MAX_ATTS {
        let size = size(table, pre, kind)?;
        while s < size && self::kind(table, pre + s)? == NodeKind::Attribute {
            s += 1;
        }
    }
    Ok(s)
}

/// Sets the attribute size of an element.
pub fn set_att_size<T: TableAccess + ?Sized>(
    table: &mut T,
    pre: usize,
    kind: NodeKind,
    size: usize,
) -> Result<()> {
    if kind != NodeKind::Element {
        return Ok(());
    }
    table.write1(pre, 0, narrow(size) | NodeKind::Element.code())
}

/// Returns the name id of an element or attribute.
#[inline]
pub fn name_id<T: TableAccess + ?Sized>(table: &T, pre: usize) -> Result<u16> {
    Ok(table.read2(pre, 1)? & NAME_MASK)
}

/// Sets the name id, keeping the namespace flag.
pub fn set_name_id<T: TableAccess + ?Sized>(table: &mut T, pre: usize, name: u16) -> Result<()> {
    let flag = table.read2(pre, 1)? & NS_FLAG;
    table.write2(pre, 1, flag | (name & NAME_MASK))
}

/// Returns true if the element declares namespaces.
#[inline]
pub fn ns_flag<T: TableAccess + ?Sized>(table: &T, pre: usize) -> Result<bool> {
    Ok(table.read2(pre, 1)? & NS_FLAG != 0)
}

/// Sets the namespace flag, keeping the name id.
pub fn set_ns_flag<T: TableAccess + ?Sized>(table: &mut T, pre: usize, flag: bool) -> Result<()> {
    let name = table.read2(pre, 1)? & NAME_MASK;
    table.write2(pre, 1, if flag { name | NS_FLAG } else { name })
}

/// Returns the namespace uri id of an element or attribute (0: none).
pub fn uri_id<T: TableAccess + ?Sized>(table: &T, pre: usize, kind: NodeKind) -> Result<u8> {
    match kind {
        NodeKind::Element => table.read1(pre, 3),
        NodeKind::Attribute => table.read1(pre, 11),
        _ => Ok(0),
    }
}

/// Sets the namespace uri id of an element or attribute.
pub fn set_uri_id<T: TableAccess + ?Sized>(
    table: &mut T,
    pre: usize,
    kind: NodeKind,
    uri: u8,
) -> Result<()> {
    match kind {
        NodeKind::Element => table.write1(pre, 3, uri),
        NodeKind::Attribute => table.write1(pre, 11, uri),
        _ => Ok(()),
    }
}

/// Returns the text or attribute value reference.
#[inline]
pub fn text_ref<T: TableAccess + ?Sized>(table: &T, pre: usize) -> Result<TextRef> {
    Ok(TextRef::from_raw(table.read5(pre, 3)?))
}

/// Sets the text or attribute value reference.
#[inline]
pub fn set_text_ref<T: TableAccess + ?Sized>(table: &mut T, pre: usize, r: TextRef) -> Result<()> {
    table.write5(pre, 3, r.raw())
}

/// Packs a value into bits 7-3 of byte 0.
#[inline]
fn narrow(value: usize) -> u8 {
    (value.min(MAX_ATTS) as u8) << 3
}

/// Buffer of encoded records waiting to be spliced into a table.
#[derive(Debug, Default, Clone)]
pub struct RecordBuffer {
    buf: BytesMut,
}

impl RecordBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with room for `records` records.
    pub fn with_capacity(records: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(records * NODE_SIZE),
        }
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.buf.len() / NODE_SIZE
    }

    /// Returns true if no record is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the encoded records.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Discards all buffered records.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Appends a document record.
    pub fn doc(&mut self, size: usize, text: TextRef, id: u32) {
        self.buf.put_u8(NodeKind::Document.code());
        self.buf.put_u16(0);
        self.buf.put_uint(text.raw(), 5);
        self.buf.put_u32(size as u32);
        self.buf.put_u32(id);
    }

    /// Appends an element record.
    #[allow(clippy::too_many_arguments)]
    pub fn elem(
        &mut self,
        dist: usize,
        name: u16,
        att_size: usize,
        size: usize,
        uri: u8,
        ns: bool,
        id: u32,
    ) {
        self.buf.put_u8(narrow(att_size) | NodeKind::Element.code());
        self.buf
            .put_u16((name & NAME_MASK) | if ns { NS_FLAG } else { 0 });
        self.buf.put_u8(uri);
        self.buf.put_u32(dist as u32);
        self.buf.put_u32(size as u32);
        self.buf.put_u32(id);
    }

    /// Appends a text, comment or processing-instruction record.
    pub fn text(&mut self, kind: NodeKind, dist: usize, text: TextRef, id: u32) {
        self.buf.put_u8(kind.code());
        self.buf.put_u16(0);
        self.buf.put_uint(text.raw(), 5);
        self.buf.put_u32(dist as u32);
        self.buf.put_u32(id);
    }

    /// Appends an attribute record.
    pub fn attr(&mut self, dist: usize, name: u16, value: TextRef, uri: u8, id: u32) {
        self.buf.put_u8(narrow(dist) | NodeKind::Attribute.code());
        self.buf.put_u16(name & NAME_MASK);
        self.buf.put_uint(value.raw(), 5);
        self.buf.put_bytes(0, 3);
        self.buf.put_u8(uri);
        self.buf.put_u32(id);
    }

    /// Sets the namespace flag of the buffered record at `index`.
    pub fn set_ns_flag(&mut self, index: usize) {
        let off = index * NODE_SIZE + 1;
        if off < self.buf.len() {
            self.buf[off] |= (NS_FLAG >> 8) as u8;
        }
    }
}
