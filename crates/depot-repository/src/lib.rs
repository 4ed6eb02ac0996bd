//! Versioned tag repository for Depot.
//!
//! A repository maps hierarchical tag names (`webapps/foo`) to the roots of
//! content graphs in an [`ObjectStore`](depot_store::ObjectStore). Every
//! mutation produces a new immutable [`RepositoryTagMap`] recorded as a
//! commit; a single ref in a [`RefStore`](depot_refs::RefStore) names the
//! current one.
//!
//! # Guarantees
//!
//! - Snapshot sequence numbers grow by one per mutation and the installed
//!   sequence never decreases.
//! - A tag is only ever bound to content whose whole graph is stored.
//! - Readers never block and always see a complete snapshot.
//! - Concurrent writers, in one process or several sharing the stores,
//!   serialize through a compare-and-swap on the root ref and retry on
//!   conflict.
//!
//! # Example
//!
//! ```no_run
//! use depot_repository::{FileRepository, Metadata};
//! use depot_types::TagPath;
//!
//! let repo = FileRepository::open("/var/lib/depot")?;
//! let war = repo.add_blob(b"...")?;
//! repo.put_tag(&TagPath::parse("webapps/foo")?, &war, "deploy", &Metadata::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod file;
pub mod listener;
pub mod repository;
pub mod tag_map;
pub mod validate;

pub use config::RepositoryConfig;
pub use engine::{SnapshotInfo, TagRepository, TagRepositoryBuilder};
pub use entry::{Metadata, RepositoryTagEntry};
pub use error::{RepositoryError, RepositoryResult};
pub use file::FileRepository;
pub use listener::{ListenerId, ListenerRegistry, TagListener};
pub use repository::Repository;
pub use tag_map::RepositoryTagMap;
pub use validate::Validator;
