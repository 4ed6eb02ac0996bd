//! Content-addressed object storage for Depot.
//!
//! This crate implements a hash-keyed object store in the style of git's
//! `.git/objects/` directory. Deployable content is staged here as blobs and
//! trees; the tag repository records its snapshots as commits.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content (archives, configuration files)
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Commit`] -- a tree, an optional parent and free-form attributes
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- loose, zstd-compressed objects on disk
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent: storing identical content twice yields one object.
//! 3. Concurrent reads are always safe.
//! 4. Typed reads fail with a typed error when an object is absent or of
//!    another kind.

pub mod commit;
pub mod error;
pub mod file;
pub mod hasher;
pub mod header;
pub mod memory;
pub mod object;
pub mod traits;

pub use commit::Commit;
pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use hasher::ContentHasher;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
