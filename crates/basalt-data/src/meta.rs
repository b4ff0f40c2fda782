//! Store metadata and its on-disk encoding.
//!
//! The metadata file is a stream of length-prefixed key/value tokens ended by
//! an empty key, followed by the element names, the attribute names and the
//! namespace structure. A CRC32 of everything before it closes the file.

use crate::namespaces::Namespaces;
use crate::tokens::{read_token, write_token, TokenSet, MAX_NAMES};
use basalt_common::{BasaltError, FtOptions, Result, StoreConfig};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Version of the record and text formats written by this build.
pub const STORAGE_VERSION: &str = "1.0";

/// Version of the auxiliary index formats written by this build.
pub const INDEX_VERSION: &str = "1.0";

mod keys {
    pub const NAME: &str = "name";
    pub const STORAGE: &str = "storage";
    pub const INDEX: &str = "index";
    pub const SIZE: &str = "size";
    pub const NDOCS: &str = "ndocs";
    pub const LAST_ID: &str = "lastid";
    pub const TEXT_INDEX: &str = "textindex";
    pub const ATTR_INDEX: &str = "attrindex";
    pub const TOKEN_INDEX: &str = "tokenindex";
    pub const FT_INDEX: &str = "ftindex";
    pub const STEMMING: &str = "stemming";
    pub const CASE_SENS: &str = "casesens";
    pub const DIACRITICS: &str = "diacritics";
    pub const STOPWORDS: &str = "stopwords";
    pub const LANGUAGE: &str = "language";
    pub const CHOP: &str = "chop";
    pub const UPD_INDEX: &str = "updindex";
    pub const UPTODATE: &str = "uptodate";
}

/// Metadata of a store.
#[derive(Debug, Clone)]
pub struct MetaData {
    /// Store name.
    pub name: String,
    /// Storage format version the store was written with.
    pub storage: String,
    /// Index format version the store was written with.
    pub index: String,
    /// Number of records.
    pub size: usize,
    /// Number of document nodes.
    pub ndocs: usize,
    /// Last assigned node id, or None before the first node.
    pub last_id: Option<u32>,
    pub text_index: bool,
    pub attr_index: bool,
    pub token_index: bool,
    pub ft_index: bool,
    /// Full-text tokenization options.
    pub ft: FtOptions,
    /// Whitespace-only texts were chopped.
    pub chop: bool,
    /// Indexes and the id map are maintained on every update.
    pub update_index: bool,
    /// Indexes reflect the current contents.
    pub uptodate: bool,
    /// Metadata changed since the last flush.
    pub dirty: bool,
}

impl MetaData {
    /// Creates metadata for a new, empty store.
    pub fn new(name: &str, config: &StoreConfig) -> Self {
        Self {
            name: name.to_string(),
            storage: STORAGE_VERSION.to_string(),
            index: INDEX_VERSION.to_string(),
            size: 0,
            ndocs: 0,
            last_id: None,
            text_index: config.text_index,
            attr_index: config.attr_index,
            token_index: config.token_index,
            ft_index: config.ft_index,
            ft: config.ft.clone(),
            chop: config.chop,
            update_index: config.update_index,
            uptodate: true,
            dirty: false,
        }
    }

    /// Marks the contents as modified.
    pub fn update(&mut self) {
        self.uptodate = false;
        self.dirty = true;
    }

    /// Assigns the next node id.
    pub fn next_id(&mut self) -> Result<u32> {
        let id = match self.last_id {
            Some(u32::MAX) => return Err(BasaltError::Internal("node ids exhausted".to_string())),
            Some(id) => id + 1,
            None => 0,
        };
        self.last_id = Some(id);
        Ok(id)
    }

    /// Returns the id the next node will receive.
    pub fn peek_id(&self) -> u32 {
        self.last_id.map_or(0, |id| id.wrapping_add(1))
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        let mut pairs = vec![
            (keys::NAME, self.name.clone()),
            (keys::STORAGE, self.storage.clone()),
            (keys::INDEX, self.index.clone()),
            (keys::SIZE, self.size.to_string()),
            (keys::NDOCS, self.ndocs.to_string()),
            (
                keys::LAST_ID,
                self.last_id.map_or_else(|| "-1".to_string(), |id| id.to_string()),
            ),
            (keys::TEXT_INDEX, flag(self.text_index)),
            (keys::ATTR_INDEX, flag(self.attr_index)),
            (keys::TOKEN_INDEX, flag(self.token_index)),
            (keys::FT_INDEX, flag(self.ft_index)),
            (keys::STEMMING, flag(self.ft.stemming)),
            (keys::CASE_SENS, flag(self.ft.case_sensitive)),
            (keys::DIACRITICS, flag(self.ft.diacritics)),
            (keys::LANGUAGE, self.ft.language.clone()),
            (keys::CHOP, flag(self.chop)),
            (keys::UPD_INDEX, flag(self.update_index)),
            (keys::UPTODATE, flag(self.uptodate)),
        ];
        if let Some(stopwords) = &self.ft.stopwords {
            pairs.push((keys::STOPWORDS, stopwords.to_string_lossy().into_owned()));
        }
        pairs
    }

    /// Encodes the metadata together with the dictionaries.
    pub fn encode(
        &self,
        elem_names: &TokenSet,
        attr_names: &TokenSet,
        nspaces: &Namespaces,
    ) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1024);
        for (key, value) in self.pairs() {
            write_token(&mut buf, key.as_bytes());
            write_token(&mut buf, value.as_bytes());
        }
        write_token(&mut buf, b"");
        elem_names.write(&mut buf);
        attr_names.write(&mut buf);
        nspaces.write(&mut buf);
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);
        buf
    }

    /// Decodes metadata and dictionaries written by [`MetaData::encode`].
    pub fn decode(bytes: &[u8]) -> Result<StoredMeta> {
        if bytes.len() < 4 {
            return Err(BasaltError::MetaCorrupted("file too short".to_string()));
        }
        let (body, mut trailer) = bytes.split_at(bytes.len() - 4);
        let expected = trailer.get_u32();
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(BasaltError::MetaCorrupted(format!(
                "checksum mismatch: expected {:08x}, found {:08x}",
                expected, actual
            )));
        }

        let mut input = body;
        let mut meta = MetaData::new("", &StoreConfig::default());
        meta.storage = String::new();
        meta.index = String::new();
        loop {
            let key = read_token(&mut input)?;
            if key.is_empty() {
                break;
            }
            let value = String::from_utf8_lossy(&read_token(&mut input)?).into_owned();
            meta.set(&String::from_utf8_lossy(&key), value)?;
        }
        check_version(&meta.storage, STORAGE_VERSION, true)?;
        check_version(&meta.index, INDEX_VERSION, false)?;

        let elem_names = TokenSet::read(&mut input, MAX_NAMES)?;
        let attr_names = TokenSet::read(&mut input, MAX_NAMES)?;
        let nspaces = Namespaces::read(&mut input)?;
        if !input.is_empty() {
            return Err(BasaltError::MetaCorrupted(format!(
                "{} trailing bytes",
                input.len()
            )));
        }
        Ok(StoredMeta {
            meta,
            elem_names,
            attr_names,
            nspaces,
        })
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        let flag = |v: &str| v == "1";
        let number = |v: &str| {
            v.parse::<usize>()
                .map_err(|_| BasaltError::MetaCorrupted(format!("{}: not a number: {}", key, v)))
        };
        match key {
            keys::NAME => self.name = value,
            keys::STORAGE => self.storage = value,
            keys::INDEX => self.index = value,
            keys::SIZE => self.size = number(&value)?,
            keys::NDOCS => self.ndocs = number(&value)?,
            keys::LAST_ID => {
                self.last_id = match value.as_str() {
                    "-1" => None,
                    v => Some(number(v)? as u32),
                }
            }
            keys::TEXT_INDEX => self.text_index = flag(&value),
            keys::ATTR_INDEX => self.attr_index = flag(&value),
            keys::TOKEN_INDEX => self.token_index = flag(&value),
            keys::FT_INDEX => self.ft_index = flag(&value),
            keys::STEMMING => self.ft.stemming = flag(&value),
            keys::CASE_SENS => self.ft.case_sensitive = flag(&value),
            keys::DIACRITICS => self.ft.diacritics = flag(&value),
            keys::STOPWORDS => self.ft.stopwords = Some(PathBuf::from(value)),
            keys::LANGUAGE => self.ft.language = value,
            keys::CHOP => self.chop = flag(&value),
            keys::UPD_INDEX => self.update_index = flag(&value),
            keys::UPTODATE => self.uptodate = flag(&value),
            // keys of newer minor versions
            _ => {}
        }
        Ok(())
    }

    /// Writes the metadata file.
    pub fn write(
        &mut self,
        path: &Path,
        elem_names: &TokenSet,
        attr_names: &TokenSet,
        nspaces: &Namespaces,
        fsync: bool,
    ) -> Result<()> {
        let buf = self.encode(elem_names, attr_names, nspaces);
        let mut file = File::create(path)?;
        file.write_all(&buf)?;
        if fsync {
            file.sync_all()?;
        }
        self.dirty = false;
        debug!(path = %path.display(), bytes = buf.len(), "Wrote metadata");
        Ok(())
    }

    /// Reads the metadata file.
    pub fn read(path: &Path) -> Result<StoredMeta> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }
}

/// Metadata together with the dictionaries persisted next to it.
#[derive(Debug)]
pub struct StoredMeta {
    pub meta: MetaData,
    pub elem_names: TokenSet,
    pub attr_names: TokenSet,
    pub nspaces: Namespaces,
}

/// Fails if `found` is newer than `supported`.
fn check_version(found: &str, supported: &str, storage: bool) -> Result<()> {
    if !is_newer(found, supported) {
        return Ok(());
    }
    error!(found, supported, storage, "Refusing store written by a newer version");
    let (found, supported) = (found.to_string(), supported.to_string());
    Err(if storage {
        BasaltError::StoreVersion { found, supported }
    } else {
        BasaltError::IndexVersion { found, supported }
    })
}

/// Compares dotted version strings numerically.
pub fn is_newer(found: &str, supported: &str) -> bool {
    let parts = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|p| p.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parts(found), parts(supported));
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        if x != y {
            return x > y;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> (MetaData, TokenSet, TokenSet, Namespaces) {
        let config = StoreConfig::default().update_index(true);
        let mut meta = MetaData::new("books", &config);
        meta.size = 42;
        meta.ndocs = 2;
        meta.next_id().unwrap();
        meta.next_id().unwrap();
        meta.ft.stopwords = Some(PathBuf::from("/etc/stop.txt"));
        let mut elems = TokenSet::new(MAX_NAMES);
        elems.index(b"book").unwrap();
        elems.index(b"title").unwrap();
        let mut attrs = TokenSet::new(MAX_NAMES);
        attrs.index(b"id").unwrap();
        let mut ns = Namespaces::new();
        ns.uri_index(b"urn:x").unwrap();
        (meta, elems, attrs, ns)
    }

    #[test]
    fn test_next_id() {
        let mut meta = MetaData::new("m", &StoreConfig::default());
        assert_eq!(meta.peek_id(), 0);
        assert_eq!(meta.next_id().unwrap(), 0);
        assert_eq!(meta.next_id().unwrap(), 1);
        assert_eq!(meta.peek_id(), 2);
        meta.last_id = Some(u32::MAX);
        assert!(meta.next_id().is_err());
    }

    #[test]
    fn test_update_clears_uptodate() {
        let mut meta = MetaData::new("m", &StoreConfig::default());
        assert!(meta.uptodate);
        meta.update();
        assert!(!meta.uptodate);
        assert!(meta.dirty);
    }

    #[test]
    fn test_encode_decode() {
        let (mut meta, elems, attrs, ns) = sample();
        meta.update();
        let buf = meta.encode(&elems, &attrs, &ns);
        let stored = MetaData::decode(&buf).unwrap();

        assert_eq!(stored.meta.name, "books");
        assert_eq!(stored.meta.size, 42);
        assert_eq!(stored.meta.ndocs, 2);
        assert_eq!(stored.meta.last_id, Some(1));
        assert!(stored.meta.update_index);
        assert!(!stored.meta.uptodate);
        assert_eq!(stored.meta.ft, meta.ft);
        assert_eq!(stored.meta.storage, STORAGE_VERSION);
        assert_eq!(stored.elem_names.id(b"title"), Some(2));
        assert_eq!(stored.attr_names.len(), 1);
        assert_eq!(stored.nspaces.uri_id(b"urn:x"), Some(1));
    }

    #[test]
    fn test_checksum_mismatch() {
        let (meta, elems, attrs, ns) = sample();
        let mut buf = meta.encode(&elems, &attrs, &ns);
        buf[6] ^= 0xFF;
        assert!(matches!(
            MetaData::decode(&buf),
            Err(BasaltError::MetaCorrupted(_))
        ));
        assert!(matches!(
            MetaData::decode(&[1, 2]),
            Err(BasaltError::MetaCorrupted(_))
        ));
    }

    #[test]
    fn test_newer_versions_are_refused() {
        let (mut meta, elems, attrs, ns) = sample();
        meta.storage = "2.0".to_string();
        let buf = meta.encode(&elems, &attrs, &ns);
        assert!(matches!(
            MetaData::decode(&buf),
            Err(BasaltError::StoreVersion { .. })
        ));

        meta.storage = STORAGE_VERSION.to_string();
        meta.index = "1.10".to_string();
        let buf = meta.encode(&elems, &attrs, &ns);
        let err = MetaData::decode(&buf).unwrap_err();
        assert!(matches!(err, BasaltError::IndexVersion { .. }));
        assert!(err.is_version_error());
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("1.10", "1.9"));
        assert!(is_newer("2", "1.9.9"));
        assert!(!is_newer("1.0", "1"));
        assert!(!is_newer("0.9", "1.0"));
        assert!(!is_newer("1.0", "1.0"));
    }

    #[test]
    fn test_write_read_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inf");
        let (mut meta, elems, attrs, ns) = sample();
        meta.dirty = true;
        meta.write(&path, &elems, &attrs, &ns, true).unwrap();
        assert!(!meta.dirty);

        let stored = MetaData::read(&path).unwrap();
        assert_eq!(stored.meta.size, 42);
        assert_eq!(stored.elem_names.key(1), b"book");
    }
}
