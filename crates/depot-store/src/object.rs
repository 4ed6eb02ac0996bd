use serde::{Deserialize, Serialize};

use depot_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content.
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// A tree, an optional parent and attributes.
    Commit,
}

impl ObjectKind {
    /// Single-byte tag used by on-disk encodings.
    pub fn type_byte(self) -> u8 {
        match self {
            Self::Blob => 1,
            Self::Tree => 2,
            Self::Commit => 3,
        }
    }

    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Blob),
            2 => Some(Self::Tree),
            3 => Some(Self::Commit),
            _ => None,
        }
    }

    fn hasher(self) -> &'static ContentHasher {
        match self {
            Self::Blob => &ContentHasher::BLOB,
            Self::Tree => &ContentHasher::TREE,
            Self::Commit => &ContentHasher::COMMIT,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag + encoded data.
///
/// `StoredObject` is the unit of storage. Backends never interpret `data`;
/// the typed wrappers below encode and decode it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Compute the content-addressed id, domain-separated by kind.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Fail with [`StoreError::WrongKind`] unless this object is `expected`.
    pub fn expect_kind(&self, id: &ObjectId, expected: ObjectKind) -> StoreResult<()> {
        if self.kind != expected {
            return Err(StoreError::WrongKind {
                id: *id,
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    pub fn into_stored_object(self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
    /// Reference to a commit (0o160000).
    Commit,
}

impl EntryMode {
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
            Self::Commit => 0o160000,
        }
    }

    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Directory),
            0o160000 => Some(Self::Commit),
            _ => None,
        }
    }

    /// The natural mode for an entry referencing an object of `kind`.
    pub fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Blob => Self::Regular,
            ObjectKind::Tree => Self::Directory,
            ObjectKind::Commit => Self::Commit,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub object_id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Directory listing object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Entries sorted by name, names unique.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a tree from entries.
    ///
    /// Entries are sorted by name for deterministic hashing. When a name
    /// occurs more than once the first occurrence is kept.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        entries.dedup_by(|later, earlier| later.name == earlier.name);
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    /// Decode the object stored under `id`.
    pub fn from_stored_object(id: &ObjectId, obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(id, ObjectKind::Tree)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
            id: *id,
            reason: e.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeEntry> {
        self.entries.iter()
    }
}
