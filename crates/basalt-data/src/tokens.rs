//! Token dictionaries for element names, attribute names, prefixes and uris.

use basalt_common::{BasaltError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;

/// The `xml` prefix, bound to [`XML_URI`] without a declaration.
pub const XML_PREFIX: &[u8] = b"xml";

/// Namespace uri of the `xml` prefix.
pub const XML_URI: &[u8] = b"http://www.w3.org/XML/1998/namespace";

/// Maximum number of distinct element or attribute names.
pub const MAX_NAMES: usize = 0x7FFF;

/// Returns the prefix of a qualified name, or an empty slice.
pub fn prefix(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(i) => &name[..i],
        None => &[],
    }
}

/// Returns the local part of a qualified name.
pub fn local(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Set of distinct tokens with dense ids starting at 1.
///
/// Id 0 is reserved for "no token".
#[derive(Debug, Clone)]
pub struct TokenSet {
    keys: Vec<Vec<u8>>,
    ids: HashMap<Vec<u8>, u32>,
    max: usize,
}

impl TokenSet {
    /// Creates an empty set holding at most `max` tokens.
    pub fn new(max: usize) -> Self {
        Self {
            keys: Vec::new(),
            ids: HashMap::new(),
            max,
        }
    }

    /// Returns the id of a token, adding it if it is new.
    ///
    /// Returns None if the set is full.
    pub fn index(&mut self, key: &[u8]) -> Option<u32> {
        if let Some(&id) = self.ids.get(key) {
            return Some(id);
        }
        if self.keys.len() >= self.max {
            return None;
        }
        self.keys.push(key.to_vec());
        let id = self.keys.len() as u32;
        self.ids.insert(key.to_vec(), id);
        Some(id)
    }

    /// Returns the id of a known token.
    pub fn id(&self, key: &[u8]) -> Option<u32> {
        self.ids.get(key).copied()
    }

    /// Returns the token of an id, or an empty slice for 0 and unknown ids.
    pub fn key(&self, id: u32) -> &[u8] {
        match id.checked_sub(1) {
            Some(i) => self.keys.get(i as usize).map(Vec::as_slice).unwrap_or(&[]),
            None => &[],
        }
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Serializes the set.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u32(self.keys.len() as u32);
        for key in &self.keys {
            write_token(buf, key);
        }
    }

    /// Deserializes a set written by [`TokenSet::write`].
    pub fn read(buf: &mut &[u8], max: usize) -> Result<Self> {
        let count = read_u32(buf)? as usize;
        if count > max {
            return Err(BasaltError::MetaCorrupted(format!(
                "{} tokens exceed limit {}",
                count, max
            )));
        }
        let mut set = Self::new(max);
        for _ in 0..count {
            let key = read_token(buf)?;
            set.index(&key);
        }
        if set.len() != count {
            return Err(BasaltError::MetaCorrupted("duplicate tokens".to_string()));
        }
        Ok(set)
    }
}

/// Writes a length-prefixed token.
pub(crate) fn write_token(buf: &mut BytesMut, token: &[u8]) {
    buf.put_u32(token.len() as u32);
    buf.put_slice(token);
}

/// Reads a length-prefixed token.
pub(crate) fn read_token(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(BasaltError::MetaCorrupted("truncated token".to_string()));
    }
    let token = buf[..len].to_vec();
    buf.advance(len);
    Ok(token)
}

/// Reads a big-endian u32.
pub(crate) fn read_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(BasaltError::MetaCorrupted("truncated integer".to_string()));
    }
    Ok(buf.get_u32())
}
