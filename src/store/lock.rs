//! Exclusive run lock for file-backed stores.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LoadError;

/// `<db>.lock` next to the database file
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut name: OsString = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Held for the lifetime of a run; the lock file is removed on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(db_path: &Path) -> Result<Self, LoadError> {
        let path = lock_path(db_path);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Owner pid, for whoever finds a stale lock
                let _ = writeln!(file, "{}", std::process::id());
                debug!(lock = %path.display(), "acquired run lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(LoadError::Busy { lock: path }),
            Err(source) => Err(LoadError::Lock { lock: path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}
