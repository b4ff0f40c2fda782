//! Update sessions, flushing and disk store files.

use super::{Data, DiskData, StoreState};
use crate::meta::MetaData;
use crate::namespaces::Namespaces;
use crate::tokens::{TokenSet, MAX_NAMES};
use basalt_common::{files, BasaltError, Result, StoreConfig};
use basalt_storage::{
    DiskValues, DiskValuesConfig, TableAccess, TableDiskAccess, TableDiskConfig, TextStore,
};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

impl<T: TableAccess, V: TextStore> Data<T, V> {
    /// Enters an update session.
    ///
    /// Takes the exclusive table lock and, for disk stores with autoflush,
    /// creates the crash marker. Fails with `Pinned` if another session
    /// holds the store.
    pub fn start_update(&mut self) -> Result<()> {
        match self.state {
            StoreState::Closed => return Err(BasaltError::Closed(self.meta.name.clone())),
            StoreState::Updating => return Ok(()),
            StoreState::Open => {}
        }
        if !self.table.lock(true)? {
            return Err(BasaltError::Pinned(self.meta.name.clone()));
        }
        if let Some(dir) = &self.dir {
            if self.options.autoflush {
                let marker = dir.join(files::UPDATE_MARKER);
                if let Err(e) = OpenOptions::new().write(true).create_new(true).open(&marker) {
                    warn!(path = %marker.display(), error = %e, "Cannot create update marker");
                    let name = self.meta.name.clone();
                    self.table.lock(false)?;
                    return Err(if e.kind() == ErrorKind::AlreadyExists {
                        BasaltError::Updating(name)
                    } else {
                        BasaltError::MarkerCreation(name)
                    });
                }
            }
        }
        self.state = StoreState::Updating;
        debug!(name = %self.meta.name, "Started update");
        Ok(())
    }

    /// Leaves an update session.
    ///
    /// With autoflush, all changes are flushed and the crash marker is
    /// removed. If the flush fails the marker stays in place.
    pub fn finish_update(&mut self) -> Result<()> {
        match self.state {
            StoreState::Closed => return Err(BasaltError::Closed(self.meta.name.clone())),
            StoreState::Open => return Ok(()),
            StoreState::Updating => {}
        }
        if self.options.autoflush {
            self.flush()?;
            self.remove_marker()?;
        }
        self.table.lock(false)?;
        self.state = StoreState::Open;
        debug!(name = %self.meta.name, "Finished update");
        Ok(())
    }

    fn remove_marker(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let marker = dir.join(files::UPDATE_MARKER);
        match std::fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %marker.display(), error = %e, "Cannot remove update marker");
                Err(BasaltError::MarkerDeletion(self.meta.name.clone()))
            }
        }
    }

    /// Writes all pending changes, including the metadata of disk stores.
    pub fn flush(&mut self) -> Result<()> {
        if self.state == StoreState::Closed {
            return Err(BasaltError::Closed(self.meta.name.clone()));
        }
        self.table.flush()?;
        self.texts.flush()?;
        self.values.flush()?;
        if let Some(dir) = &self.dir {
            self.meta.write(
                &dir.join(files::META),
                &self.elem_names,
                &self.attr_names,
                &self.nspaces,
                self.options.fsync,
            )?;
        }
        debug!(name = %self.meta.name, records = self.table.len(), "Flushed store");
        Ok(())
    }

    /// Closes the store.
    ///
    /// Pending changes are flushed and an open update session is finished.
    /// The table lock is released even if flushing fails; the first error is
    /// returned.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StoreState::Closed {
            return Ok(());
        }
        let updating = self.state == StoreState::Updating;
        let mut result = self.flush();
        if result.is_ok() && updating {
            result = self.remove_marker();
        }
        let closed = self.table.close();
        let texts = self.texts.close();
        let values = self.values.close();
        self.state = StoreState::Closed;
        debug!(name = %self.meta.name, "Closed store");
        result.and(closed).and(texts).and(values)
    }
}

impl DiskData {
    fn open_files(dir: &Path, config: &StoreConfig) -> Result<(TableDiskAccess, DiskValues, DiskValues)> {
        let table = TableDiskAccess::open(TableDiskConfig {
            dir: dir.to_path_buf(),
            cache_blocks: config.table_cache_blocks,
            fsync: config.fsync,
        })?;
        let values_config = |file: &str, free: &str| DiskValuesConfig {
            path: dir.join(file),
            free_path: dir.join(free),
            compress_threshold: config.compress_threshold,
            fsync: config.fsync,
        };
        let texts = DiskValues::open(values_config(files::TEXTS, files::TEXTS_FREE))?;
        let values = DiskValues::open(values_config(files::VALUES, files::VALUES_FREE))?;
        Ok((table, texts, values))
    }

    /// Creates an empty disk store in `dir`.
    pub fn create(dir: &Path, name: &str, config: &StoreConfig, store_id: u64) -> Result<Self> {
        if dir.join(files::META).exists() {
            return Err(BasaltError::StoreExists(name.to_string()));
        }
        std::fs::create_dir_all(dir)?;
        let (table, texts, values) = Self::open_files(dir, config)?;
        let mut data = Data::from_parts(
            MetaData::new(name, config),
            table,
            texts,
            values,
            TokenSet::new(MAX_NAMES),
            TokenSet::new(MAX_NAMES),
            Namespaces::new(),
            Some(dir.to_path_buf()),
            config.clone(),
            store_id,
        );
        if !data.table.lock(false)? {
            return Err(BasaltError::Pinned(name.to_string()));
        }
        data.flush()?;
        debug!(name, dir = %dir.display(), "Created store");
        Ok(data)
    }

    /// Opens the disk store in `dir`.
    ///
    /// Fails with `Updating` if a crash marker is present, before any
    /// record is read.
    pub fn open(dir: &Path, name: &str, config: &StoreConfig, store_id: u64) -> Result<Self> {
        if !dir.join(files::META).exists() {
            return Err(BasaltError::StoreNotFound(name.to_string()));
        }
        let marker = dir.join(files::UPDATE_MARKER);
        if marker.exists() {
            warn!(name, path = %marker.display(), "Found update marker");
            return Err(BasaltError::Updating(name.to_string()));
        }
        let stored = MetaData::read(&dir.join(files::META))?;
        let (table, texts, values) = Self::open_files(dir, config)?;
        if table.len() != stored.meta.size {
            return Err(BasaltError::MetaCorrupted(format!(
                "{} records in table, {} in metadata",
                table.len(),
                stored.meta.size
            )));
        }
        let mut options = config.clone();
        options.update_index = stored.meta.update_index;
        let mut data = Data::from_parts(
            stored.meta,
            table,
            texts,
            values,
            stored.elem_names,
            stored.attr_names,
            stored.nspaces,
            Some(dir.to_path_buf()),
            options,
            store_id,
        );
        if !data.table.lock(false)? {
            return Err(BasaltError::Pinned(name.to_string()));
        }
        debug!(name, records = data.table.len(), "Opened store");
        Ok(data)
    }
}
