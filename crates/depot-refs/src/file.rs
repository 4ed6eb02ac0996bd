//! Filesystem reference store.
//!
//! Each ref is a file under the store root named after the ref
//! (`refs/depot/root` → `<root>/refs/depot/root`) holding the target's hex
//! id and a newline. Updates follow git's lock-file protocol:
//!
//! 1. Create `<ref>.lock` exclusively (a second writer gets [`RefError::Locked`])
//! 2. Re-read the current value and check the expected one
//! 3. Write the new value into the lock file and sync it
//! 4. Rename the lock file over the ref
//!
//! The rename is atomic, so readers see either the old or the new value.
//!
//! The store root may be shared with other data: listing only walks
//! `<root>/refs` and skips anything that is not a well-formed ref.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use depot_types::ObjectId;

use crate::error::{RefError, Result};
use crate::lock::LockFile;
use crate::names::{validate_ref_name, REFS_PREFIX};
use crate::traits::RefStore;

#[derive(Debug, Clone)]
pub struct FileRefStore {
    root: PathBuf,
}

impl FileRefStore {
    /// Open (or create) a ref store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.root.clone(), |path, component| path.join(component))
    }

    fn lock(&self, name: &str) -> Result<LockFile> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        LockFile::acquire(&path).inspect_err(|e| {
            if let RefError::Locked { path } = e {
                warn!(ref_name = name, lock = %path.display(), "ref is locked");
            }
        })
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<(String, ObjectId)>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect(&path, prefix, out)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !name.starts_with(prefix) || validate_ref_name(&name).is_err() {
                continue;
            }
            match self.read_ref(&name) {
                Ok(Some(target)) => out.push((name, target)),
                Ok(None) => {}
                Err(e) => warn!(ref_name = %name, error = %e, "skipping unreadable ref"),
            }
        }
        Ok(())
    }
}

impl RefStore for FileRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        validate_ref_name(name)?;
        let contents = match fs::read_to_string(self.ref_path(name)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        contents
            .parse::<ObjectId>()
            .map(Some)
            .map_err(|e| RefError::Corrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    fn write_ref(&self, name: &str, target: &ObjectId) -> Result<()> {
        let lock = self.lock(name)?;
        lock.commit(format!("{target}\n").as_bytes())?;
        debug!(ref_name = name, target = %target.short_hex(), "ref written");
        Ok(())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<bool> {
        let lock = self.lock(name)?;
        let current = self.read_ref(name)?;
        if current.as_ref() != expected {
            debug!(ref_name = name, "ref moved since it was read");
            return Ok(false);
        }
        lock.commit(format!("{new}\n").as_bytes())?;
        debug!(ref_name = name, target = %new.short_hex(), "ref swapped");
        Ok(true)
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        self.lock(name)?.remove_target()
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let mut out = Vec::new();
        let refs_dir = self.root.join(REFS_PREFIX.trim_end_matches('/'));
        self.collect(&refs_dir, prefix, &mut out)?;
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ObjectId {
        ObjectId::from_hash([n; 32])
    }

    fn temp_store() -> (tempfile::TempDir, FileRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn write_then_read() {
        let (_dir, store) = temp_store();
        store.write_ref("refs/depot/root", &id(1)).unwrap();
        assert_eq!(store.read_ref("refs/depot/root").unwrap(), Some(id(1)));

        let raw = fs::read_to_string(store.root().join("refs/depot/root")).unwrap();
        assert_eq!(raw, format!("{}\n", id(1)));
    }

    #[test]
    fn cas_semantics() {
        let (_dir, store) = temp_store();
        assert!(store.compare_and_swap("refs/r", None, &id(1)).unwrap());
        assert!(!store.compare_and_swap("refs/r", None, &id(2)).unwrap());
        assert!(!store.compare_and_swap("refs/r", Some(&id(7)), &id(2)).unwrap());
        assert!(store.compare_and_swap("refs/r", Some(&id(1)), &id(2)).unwrap());
        assert_eq!(store.read_ref("refs/r").unwrap(), Some(id(2)));
    }

    #[test]
    fn held_lock_reports_locked() {
        let (_dir, store) = temp_store();
        store.write_ref("refs/r", &id(1)).unwrap();
        let _held = LockFile::acquire(&store.ref_path("refs/r")).unwrap();

        let err = store
            .compare_and_swap("refs/r", Some(&id(1)), &id(2))
            .unwrap_err();
        assert!(matches!(err, RefError::Locked { .. }));
        assert_eq!(store.read_ref("refs/r").unwrap(), Some(id(1)));
    }

    #[test]
    fn failed_cas_releases_lock() {
        let (_dir, store) = temp_store();
        store.write_ref("refs/r", &id(1)).unwrap();
        assert!(!store.compare_and_swap("refs/r", None, &id(2)).unwrap());
        assert!(!store.root().join("refs/r.lock").exists());
        assert!(store.compare_and_swap("refs/r", Some(&id(1)), &id(2)).unwrap());
    }

    #[test]
    fn corrupt_ref_is_reported() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.root().join("refs")).unwrap();
        fs::write(store.root().join("refs/r"), "not-hex\n").unwrap();
        assert!(matches!(
            store.read_ref("refs/r"),
            Err(RefError::Corrupt { .. })
        ));
    }

    #[test]
    fn list_and_delete() {
        let (_dir, store) = temp_store();
        store.write_ref("refs/a/one", &id(1)).unwrap();
        store.write_ref("refs/a/two", &id(2)).unwrap();
        store.write_ref("refs/b", &id(3)).unwrap();

        let names: Vec<String> = store
            .list_refs("refs/a/")
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, ["refs/a/one", "refs/a/two"]);

        assert!(store.delete_ref("refs/a/one").unwrap());
        assert!(!store.delete_ref("refs/a/one").unwrap());
        assert_eq!(store.list_refs("").unwrap().len(), 2);
    }

    #[test]
    fn list_skips_files_that_are_not_refs() {
        let (_dir, store) = temp_store();
        store.write_ref("refs/depot/root", &id(1)).unwrap();
        let root = store.root();
        fs::create_dir_all(root.join("objects/ab")).unwrap();
        fs::write(root.join("objects/ab/cdef"), [0x28, 0xb5, 0x2f, 0xfd, 0xff]).unwrap();
        fs::write(root.join("depot.toml"), "max_retries = 3\n").unwrap();
        fs::write(root.join("refs/depot/garbage"), [0xff, 0xfe]).unwrap();
        fs::write(root.join("refs/depot/stale.lock"), "").unwrap();
        fs::write(root.join("refs/depot/.hidden"), format!("{}\n", id(2))).unwrap();

        let listed = store.list_refs("").unwrap();
        assert_eq!(listed, [("refs/depot/root".to_string(), id(1))]);
    }

    #[test]
    fn list_on_empty_store() {
        let (_dir, store) = temp_store();
        assert!(store.list_refs("").unwrap().is_empty());
    }

    #[test]
    fn invalid_names_never_touch_disk() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.write_ref("../outside", &id(1)),
            Err(RefError::InvalidName { .. })
        ));
    }
}
