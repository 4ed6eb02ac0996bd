use thiserror::Error;

use depot_refs::RefError;
use depot_store::StoreError;
use depot_types::{ObjectId, TagPath, TypeError};

/// Errors surfaced by repository operations.
///
/// A lost compare-and-swap race is not an error: the update engine retries
/// it internally and only reports [`TooManyConflicts`](Self::TooManyConflicts)
/// once its retry budget is spent.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The content graph under `id` references an object that is not stored.
    #[error("content {id} is incomplete: object {missing} is missing")]
    Validation { id: ObjectId, missing: ObjectId },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("invalid tag name: {0}")]
    InvalidTagName(#[from] TypeError),

    /// A tag the operation reads from is not bound.
    #[error("no tag named {name}")]
    TagNotFound { name: TagPath },

    #[error("invalid metadata key {key:?}: {reason}")]
    InvalidMetadata { key: String, reason: String },

    /// A stored snapshot or tag entry cannot be decoded.
    #[error("corrupt snapshot object {id}: {reason}")]
    CorruptSnapshot { id: ObjectId, reason: String },

    /// Every attempt lost its race against another writer.
    #[error("update abandoned after {attempts} conflicting attempts")]
    TooManyConflicts { attempts: u32 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("repository is closed")]
    Closed,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
