//! Store factory owning the configuration.

use crate::builder::Builder;
use crate::data::{DiskData, MemData};
use crate::reader::DataClip;
use basalt_common::{files, BasaltError, Result, StoreConfig};
use tracing::{debug, info};

/// Creates, opens and drops stores under one database directory.
///
/// Every store instance created through a context receives a distinct
/// instance id.
#[derive(Debug)]
pub struct Context {
    config: StoreConfig,
    next_store_id: u64,
}

impl Context {
    /// Creates a context with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            next_store_id: 0,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn next_store_id(&mut self) -> u64 {
        self.next_store_id += 1;
        self.next_store_id
    }

    /// Creates an empty memory store.
    pub fn create_mem(&mut self, name: &str) -> MemData {
        let id = self.next_store_id();
        MemData::new(name, &self.config, id)
    }

    /// Creates a builder for a memory store.
    pub fn builder(&mut self, name: &str) -> Builder {
        let id = self.next_store_id();
        Builder::with_store_id(name, &self.config, id)
    }

    /// Returns true if a disk store with this name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.config.store_dir(name).join(files::META).exists()
    }

    /// Creates a disk store holding a copy of a memory store.
    pub fn create_disk(&mut self, name: &str, source: &MemData) -> Result<DiskData> {
        let dir = self.config.store_dir(name);
        let id = self.next_store_id();
        let mut data = DiskData::create(&dir, name, &self.config, id)?;
        if !source.is_empty() {
            data.start_update()?;
            data.insert(0, None, &DataClip::all(source)?)?;
            data.finish_update()?;
        }
        data.flush()?;
        info!(name, records = data.len(), "Created database");
        Ok(data)
    }

    /// Opens a disk store.
    pub fn open_disk(&mut self, name: &str) -> Result<DiskData> {
        let dir = self.config.store_dir(name);
        let id = self.next_store_id();
        DiskData::open(&dir, name, &self.config, id)
    }

    /// Deletes the files of a disk store.
    pub fn drop_disk(&self, name: &str) -> Result<()> {
        if !self.exists(name) {
            return Err(BasaltError::StoreNotFound(name.to_string()));
        }
        let dir = self.config.store_dir(name);
        std::fs::remove_dir_all(&dir)?;
        debug!(name, dir = %dir.display(), "Dropped database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_ids_are_distinct() {
        let mut ctx = Context::new(StoreConfig::default());
        let a = ctx.create_mem("a");
        let b = ctx.builder("b").finish().unwrap();
        assert_ne!(a.store_id(), b.store_id());
        assert_eq!(a.db_name(), "a");
    }

    #[test]
    fn test_create_open_drop() {
        let tmp = tempdir().unwrap();
        let mut ctx = Context::new(StoreConfig::new(tmp.path()));
        let mut b = ctx.builder("books");
        b.start_doc("books.xml").unwrap();
        b.start_elem("books", &[], &[]).unwrap();
        b.end_elem().unwrap();
        b.end_doc().unwrap();
        let mem = b.finish().unwrap();

        assert!(!ctx.exists("books"));
        let mut disk = ctx.create_disk("books", &mem).unwrap();
        assert!(ctx.exists("books"));
        assert_eq!(disk.len(), 2);
        disk.close().unwrap();

        assert!(matches!(
            ctx.create_disk("books", &mem),
            Err(BasaltError::StoreExists(_))
        ));
        let mut disk = ctx.open_disk("books").unwrap();
        assert_eq!(disk.name(1).unwrap(), b"books");
        disk.close().unwrap();

        ctx.drop_disk("books").unwrap();
        assert!(!ctx.exists("books"));
        assert!(matches!(
            ctx.drop_disk("books"),
            Err(BasaltError::StoreNotFound(_))
        ));
        assert!(matches!(
            ctx.open_disk("books"),
            Err(BasaltError::StoreNotFound(_))
        ));
    }
}
