use std::io::{Cursor, Read};

use depot_types::ObjectId;

use crate::commit::Commit;
use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, ObjectKind, StoredObject, Tree};

/// Content-addressed object store.
///
/// Backends implement the three primitives; the typed operations are
/// provided on top of them. All implementations must satisfy:
/// - Objects are immutable once written: the same data always produces the
///   same id.
/// - `write` is idempotent; storing identical content twice keeps one copy.
/// - Concurrent reads are always safe.
/// - I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by id. Returns `Ok(None)` if it does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed id.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// The kind of the object named by `id`, `None` if absent.
    fn kind(&self, id: &ObjectId) -> StoreResult<Option<ObjectKind>> {
        Ok(self.read(id)?.map(|obj| obj.kind))
    }

    /// Read an object that must exist.
    fn read_existing(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    fn add_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.write(&Blob::new(data).into_stored_object())
    }

    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let obj = self.read_existing(id)?;
        obj.expect_kind(id, ObjectKind::Blob)?;
        Ok(obj.data)
    }

    /// Open a blob for streaming reads.
    fn open_blob(&self, id: &ObjectId) -> StoreResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read_blob(id)?)))
    }

    fn add_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        self.write(&tree.to_stored_object()?)
    }

    fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        Tree::from_stored_object(id, &self.read_existing(id)?)
    }

    fn add_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
        self.write(&commit.to_stored_object()?)
    }

    fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        Commit::from_stored_object(id, &self.read_existing(id)?)
    }
}
