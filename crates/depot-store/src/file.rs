//! Loose-object store on the local filesystem.
//!
//! Layout mirrors git's loose objects: the object `5e1f...` lives at
//! `<root>/5e/1f...`. On-disk format:
//!
//! ```text
//! [1 byte: kind tag]
//! [N bytes: zstd-compressed payload]
//! ```
//!
//! Objects are written to a temporary file in the destination directory and
//! renamed into place, so a reader never observes a partial object. Reads
//! recompute the content hash and reject mismatches. Blobs opened with
//! [`open_blob`](ObjectStore::open_blob) are decompressed as they are read
//! and checked when the stream ends.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use depot_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// zstd level used for new objects.
const COMPRESSION_LEVEL: i32 = 3;

/// Filesystem-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Open an object file positioned after its kind tag.
    fn open_object(&self, id: &ObjectId) -> StoreResult<Option<(ObjectKind, File)>> {
        let mut file = match File::open(self.object_path(id)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };
        let mut tag = [0u8; 1];
        file.read_exact(&mut tag).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => corrupt("empty object file".into()),
            _ => e.into(),
        })?;
        let kind = ObjectKind::from_type_byte(tag[0])
            .ok_or_else(|| corrupt(format!("unknown kind tag {}", tag[0])))?;
        Ok(Some((kind, file)))
    }

    fn decode(id: &ObjectId, raw: &[u8]) -> StoreResult<StoredObject> {
        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };

        let (&tag, compressed) = raw
            .split_first()
            .ok_or_else(|| corrupt("empty object file".into()))?;
        let kind = ObjectKind::from_type_byte(tag)
            .ok_or_else(|| corrupt(format!("unknown kind tag {tag}")))?;
        let data = zstd::decode_all(compressed).map_err(|e| corrupt(e.to_string()))?;

        let object = StoredObject::new(kind, data);
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(object)
    }
}

impl ObjectStore for FileObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let raw = match fs::read(self.object_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(id, &raw).map(Some)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }

        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Io(io::Error::other("object path has no parent")))?;
        fs::create_dir_all(dir)?;

        let compressed = zstd::encode_all(object.data.as_slice(), COMPRESSION_LEVEL)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&[object.kind.type_byte()])?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(id = %id.short_hex(), kind = %object.kind, size = object.size(), "object written");
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }

    // Only the tag byte is needed.
    fn kind(&self, id: &ObjectId) -> StoreResult<Option<ObjectKind>> {
        Ok(self.open_object(id)?.map(|(kind, _)| kind))
    }

    fn open_blob(&self, id: &ObjectId) -> StoreResult<Box<dyn Read + Send>> {
        let (kind, file) = self.open_object(id)?.ok_or(StoreError::NotFound(*id))?;
        if kind != ObjectKind::Blob {
            return Err(StoreError::WrongKind {
                id: *id,
                expected: ObjectKind::Blob,
                actual: kind,
            });
        }
        let decoder = zstd::stream::read::Decoder::new(file)?;
        Ok(Box::new(VerifyingReader::new(*id, decoder)))
    }
}

/// Hashes a blob as it streams and fails the read that reaches the end if
/// the content does not match its id.
struct VerifyingReader<R> {
    id: ObjectId,
    inner: R,
    hasher: blake3::Hasher,
    verified: bool,
}

impl<R: Read> VerifyingReader<R> {
    fn new(id: ObjectId, inner: R) -> Self {
        Self {
            id,
            inner,
            hasher: ContentHasher::BLOB.start(),
            verified: false,
        }
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        } else if !buf.is_empty() && !self.verified {
            let computed = ObjectId::from_hash(*self.hasher.finalize().as_bytes());
            if computed != self.id {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    StoreError::HashMismatch {
                        id: self.id,
                        computed,
                    },
                ));
            }
            self.verified = true;
        }
        Ok(n)
    }
}
