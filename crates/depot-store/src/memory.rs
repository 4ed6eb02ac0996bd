use std::collections::HashMap;
use std::sync::RwLock;

use depot_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Objects live behind a `RwLock` and are
/// cloned on read and write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Drop an object. Test hook for simulating dangling references; the
    /// repository itself never deletes.
    pub fn remove(&self, id: &ObjectId) -> bool {
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::commit::Commit;
    use crate::object::{EntryMode, ObjectKind, Tree, TreeEntry};

    #[test]
    fn add_and_read_blob() {
        let store = InMemoryObjectStore::new();
        let id = store.add_blob(b"hello world").unwrap();
        assert!(!id.is_null());
        assert_eq!(store.read_blob(&id).unwrap(), b"hello world");
        assert_eq!(store.kind(&id).unwrap(), Some(ObjectKind::Blob));
    }

    #[test]
    fn open_blob_streams_content() {
        let store = InMemoryObjectStore::new();
        let id = store.add_blob(b"archive bytes").unwrap();
        let mut buf = String::new();
        store.open_blob(&id).unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "archive bytes");
    }

    #[test]
    fn add_and_read_tree_and_commit() {
        let store = InMemoryObjectStore::new();
        let blob = store.add_blob(b"content").unwrap();
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "index.html", blob)]);
        let tree_id = store.add_tree(&tree).unwrap();
        assert_eq!(store.read_tree(&tree_id).unwrap(), tree);

        let commit = Commit::new(tree_id).with_attribute("sequence", "1");
        let commit_id = store.add_commit(&commit).unwrap();
        assert_eq!(store.read_commit(&commit_id).unwrap(), commit);
        assert_eq!(store.kind(&commit_id).unwrap(), Some(ObjectKind::Commit));
    }

    #[test]
    fn identical_content_is_stored_once() {
        let store = InMemoryObjectStore::new();
        let id1 = store.add_blob(b"same").unwrap();
        let id2 = store.add_blob(b"same").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_objects() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::digest(b"missing");
        assert!(!store.exists(&id).unwrap());
        assert_eq!(store.kind(&id).unwrap(), None);
        assert!(matches!(store.read_blob(&id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.read_tree(&id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.read_commit(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn typed_reads_check_kind() {
        let store = InMemoryObjectStore::new();
        let blob = store.add_blob(b"plain").unwrap();
        assert!(matches!(
            store.read_tree(&blob),
            Err(StoreError::WrongKind { .. })
        ));
        assert!(matches!(
            store.read_commit(&blob),
            Err(StoreError::WrongKind { .. })
        ));

        let tree = store.add_tree(&Tree::empty()).unwrap();
        assert!(matches!(
            store.read_blob(&tree),
            Err(StoreError::WrongKind { .. })
        ));
    }

    #[test]
    fn remove_simulates_dangling_reference() {
        let store = InMemoryObjectStore::new();
        let id = store.add_blob(b"gone soon").unwrap();
        assert!(store.remove(&id));
        assert!(!store.exists(&id).unwrap());
        assert!(!store.remove(&id));
    }

    #[test]
    fn concurrent_writers_agree_on_ids() {
        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.add_blob(b"shared data").unwrap())
            })
            .collect();
        let ids: Vec<ObjectId> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryObjectStore::new();
        store.add_blob(b"x").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("object_count"));
    }
}
