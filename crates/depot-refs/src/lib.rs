//! Durable named references for Depot.
//!
//! A reference is a named pointer to an [`ObjectId`](depot_types::ObjectId).
//! The tag repository keeps exactly one of them, the root pointer, naming
//! the commit of the currently installed tag snapshot. Every backend offers
//! an atomic [`compare_and_swap`](RefStore::compare_and_swap) so writers on
//! different threads, processes or nodes can race safely.
//!
//! # Modules
//!
//! - [`error`] — Error types for ref operations
//! - [`traits`] — The [`RefStore`] trait
//! - [`names`] — Ref name validation
//! - [`memory`] — In-memory [`InMemoryRefStore`]
//! - [`file`] — Lock-file based [`FileRefStore`]

pub mod error;
pub mod file;
mod lock;
pub mod memory;
pub mod names;
pub mod traits;

pub use error::{RefError, Result};
pub use file::FileRefStore;
pub use memory::InMemoryRefStore;
pub use names::validate_ref_name;
pub use traits::RefStore;
