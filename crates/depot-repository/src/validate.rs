//! Merkle completeness checks.
//!
//! An id is valid when every object reachable from it is stored: a blob is
//! valid if present, a tree if all its entries are valid, a commit if its
//! tree is valid. Parents of commits are not followed; a snapshot only
//! vouches for the content it references.
//!
//! The walk is iterative with an explicit worklist and a visited set, so
//! deep or shared subgraphs cost one visit per object. Ids proven valid are
//! remembered in a bounded LRU cache: objects are immutable, so a valid
//! graph stays valid for as long as the store keeps its objects.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tracing::debug;

use depot_store::{ObjectKind, ObjectStore, StoreResult};
use depot_types::ObjectId;

pub struct Validator {
    known_valid: Option<Mutex<LruCache<ObjectId, ()>>>,
}

impl Validator {
    /// A validator remembering up to `capacity` valid ids; zero disables the
    /// cache.
    pub fn new(capacity: usize) -> Self {
        Self {
            known_valid: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// The first unreachable object found under `root`, or `None` when the
    /// graph is complete.
    pub fn find_missing(
        &self,
        store: &dyn ObjectStore,
        root: &ObjectId,
    ) -> StoreResult<Option<ObjectId>> {
        if self.is_cached(root) {
            return Ok(None);
        }

        let mut worklist = vec![*root];
        let mut visited = HashSet::new();
        while let Some(id) = worklist.pop() {
            if !visited.insert(id) || self.is_cached(&id) {
                continue;
            }
            match store.kind(&id)? {
                None => {
                    debug!(root = %root.short_hex(), missing = %id.short_hex(), "validation failed");
                    return Ok(Some(id));
                }
                Some(ObjectKind::Blob) => {}
                Some(ObjectKind::Tree) => {
                    let tree = store.read_tree(&id)?;
                    worklist.extend(tree.iter().map(|entry| entry.object_id));
                }
                Some(ObjectKind::Commit) => {
                    worklist.push(store.read_commit(&id)?.tree);
                }
            }
        }

        if let Some(cache) = &self.known_valid {
            let mut cache = cache.lock().expect("lock poisoned");
            for id in visited {
                cache.put(id, ());
            }
        }
        Ok(None)
    }

    pub fn is_valid(&self, store: &dyn ObjectStore, root: &ObjectId) -> StoreResult<bool> {
        Ok(self.find_missing(store, root)?.is_none())
    }

    /// Number of ids currently remembered as valid.
    pub fn cached(&self) -> usize {
        self.known_valid
            .as_ref()
            .map_or(0, |cache| cache.lock().expect("lock poisoned").len())
    }

    fn is_cached(&self, id: &ObjectId) -> bool {
        self.known_valid
            .as_ref()
            .is_some_and(|cache| cache.lock().expect("lock poisoned").get(id).is_some())
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("cached", &self.cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_store::{Commit, EntryMode, InMemoryObjectStore, Tree, TreeEntry};

    fn tree_of(store: &InMemoryObjectStore, entries: Vec<(&str, ObjectId, EntryMode)>) -> ObjectId {
        let entries = entries
            .into_iter()
            .map(|(name, id, mode)| TreeEntry::new(mode, name, id))
            .collect();
        store.add_tree(&Tree::new(entries)).unwrap()
    }

    #[test]
    fn blobs_are_valid_when_present() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(16);
        let blob = store.add_blob(b"x").unwrap();
        assert!(v.is_valid(&store, &blob).unwrap());
        assert!(!v.is_valid(&store, &ObjectId::from_hash([3; 32])).unwrap());
    }

    #[test]
    fn nested_trees_and_commits() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(16);
        let blob = store.add_blob(b"x").unwrap();
        let inner = tree_of(&store, vec![("x", blob, EntryMode::Regular)]);
        let outer = tree_of(&store, vec![("dir", inner, EntryMode::Directory)]);
        let commit = store.add_commit(&Commit::new(outer)).unwrap();

        assert_eq!(v.find_missing(&store, &commit).unwrap(), None);
        assert!(v.cached() >= 4);
    }

    #[test]
    fn reports_the_missing_leaf() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(16);
        let missing = ObjectId::from_hash([7; 32]);
        let present = store.add_blob(b"ok").unwrap();
        let tree = tree_of(
            &store,
            vec![
                ("a", present, EntryMode::Regular),
                ("b", missing, EntryMode::Regular),
            ],
        );
        assert_eq!(v.find_missing(&store, &tree).unwrap(), Some(missing));
        assert_eq!(v.cached(), 0);
    }

    #[test]
    fn commit_parents_are_not_followed() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(16);
        let tree = store.add_tree(&Tree::empty()).unwrap();
        let commit = store
            .add_commit(&Commit::new(tree).with_parent(Some(ObjectId::from_hash([5; 32]))))
            .unwrap();
        assert!(v.is_valid(&store, &commit).unwrap());
    }

    #[test]
    fn shared_subtrees_are_visited_once() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(0);
        let blob = store.add_blob(b"shared").unwrap();
        let mut level = tree_of(&store, vec![("leaf", blob, EntryMode::Regular)]);
        for _ in 0..64 {
            level = tree_of(
                &store,
                vec![
                    ("left", level, EntryMode::Directory),
                    ("right", level, EntryMode::Directory),
                ],
            );
        }
        // 2^64 paths, 66 distinct objects.
        assert!(v.is_valid(&store, &level).unwrap());
        assert_eq!(v.cached(), 0);
    }

    #[test]
    fn cached_results_skip_the_store() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(16);
        let blob = store.add_blob(b"x").unwrap();
        let tree = tree_of(&store, vec![("x", blob, EntryMode::Regular)]);
        assert!(v.is_valid(&store, &tree).unwrap());

        store.remove(&blob);
        assert!(v.is_valid(&store, &tree).unwrap());
        assert!(!Validator::new(16).is_valid(&store, &tree).unwrap());
    }

    #[test]
    fn cache_is_bounded() {
        let store = InMemoryObjectStore::new();
        let v = Validator::new(2);
        for n in 0..10u8 {
            let blob = store.add_blob(&[n]).unwrap();
            assert!(v.is_valid(&store, &blob).unwrap());
        }
        assert_eq!(v.cached(), 2);
    }
}
