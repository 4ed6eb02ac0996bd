use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{RefError, Result};

const LOCK_SUFFIX: &str = ".lock";

/// RAII lock file guard.
///
/// Creates `<path>.lock` with create-new semantics; [`commit`](Self::commit)
/// atomically renames it over `<path>`. Dropped without committing, the lock
/// file is removed.
pub(crate) struct LockFile {
    path: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    done: bool,
}

impl LockFile {
    /// Fails with [`RefError::Locked`] if the lock file already exists.
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let lock_path = PathBuf::from(format!("{}{}", path.display(), LOCK_SUFFIX));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    RefError::Locked {
                        path: lock_path.clone(),
                    }
                } else {
                    RefError::Io(e)
                }
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            lock_path,
            file: Some(file),
            done: false,
        })
    }

    /// Write `contents`, sync, and rename the lock over the target.
    pub(crate) fn commit(mut self, contents: &[u8]) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.write_all(contents)?;
            file.sync_all()?;
        }
        fs::rename(&self.lock_path, &self.path)?;
        self.done = true;
        Ok(())
    }

    /// Delete the target while holding the lock, then release it.
    pub(crate) fn remove_target(mut self) -> Result<bool> {
        let existed = match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        self.file.take();
        fs::remove_file(&self.lock_path)?;
        self.done = true;
        Ok(existed)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.done {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
