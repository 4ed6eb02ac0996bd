//! The [`RefStore`] trait defining the reference storage interface.

use depot_types::ObjectId;

use crate::error::Result;

/// Storage backend for named references.
///
/// Implementations must be thread-safe and make each operation atomic with
/// respect to every other operation on the same name, including operations
/// issued by other processes sharing the backend.
pub trait RefStore: Send + Sync {
    /// Read a ref. Returns `Ok(None)` if it does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Unconditionally create or overwrite a ref.
    fn write_ref(&self, name: &str, target: &ObjectId) -> Result<()>;

    /// Atomically set `name` to `new` if its current value is `expected`
    /// (`None` meaning "does not exist yet").
    ///
    /// Returns `Ok(false)` when the current value differs. Backends that
    /// detect a concurrent writer mid-update may return
    /// [`RefError::Locked`](crate::RefError::Locked) instead.
    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<bool>;

    /// Delete a ref. Returns `Ok(true)` if it existed.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// All refs whose name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>>;
}
