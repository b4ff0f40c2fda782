//! Advisory file locks guarding a store against concurrent writers.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Lock mode requested on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of readers may hold a shared lock.
    Shared,
    /// A single writer holds the lock; no shared holders may exist.
    Exclusive,
}

/// A non-blocking advisory lock on an existing file.
///
/// The lock is tied to this handle: a second handle on the same file, even
/// within the same process, competes for it. Dropping the handle releases
/// the lock.
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: Option<LockMode>,
}

impl FileLock {
    /// Opens the file for locking without acquiring a lock.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).open(&path)?;
        Ok(Self {
            file,
            path,
            mode: None,
        })
    }

    /// Tries to acquire the lock in the given mode without waiting.
    ///
    /// Returns false if another handle holds a conflicting lock. A failed
    /// upgrade from shared to exclusive restores the shared lock.
    pub fn try_lock(&mut self, mode: LockMode) -> io::Result<bool> {
        if self.mode == Some(mode) {
            return Ok(true);
        }
        if Self::flock(&self.file, Some(mode))? {
            self.mode = Some(mode);
            return Ok(true);
        }
        // Linux drops the old lock before a conversion attempt
        if let Some(previous) = self.mode {
            if !Self::flock(&self.file, Some(previous))? {
                self.mode = None;
            }
        }
        Ok(false)
    }

    /// Releases the lock.
    pub fn unlock(&mut self) -> io::Result<()> {
        if self.mode.take().is_some() {
            Self::flock(&self.file, None)?;
        }
        Ok(())
    }

    /// Returns the currently held mode.
    pub fn mode(&self) -> Option<LockMode> {
        self.mode
    }

    /// Get the path of the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn flock(file: &File, mode: Option<LockMode>) -> io::Result<bool> {
        use libc::{flock, EWOULDBLOCK, LOCK_EX, LOCK_NB, LOCK_SH, LOCK_UN};

        let op = match mode {
            Some(LockMode::Shared) => LOCK_SH | LOCK_NB,
            Some(LockMode::Exclusive) => LOCK_EX | LOCK_NB,
            None => LOCK_UN,
        };
        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, op) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(EWOULDBLOCK) {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(true)
    }

    #[cfg(not(unix))]
    fn flock(_file: &File, _mode: Option<LockMode>) -> io::Result<bool> {
        // Locking is not enforced on this platform
        Ok(true)
    }
}
