//! Foundation types for Depot.
//!
//! Every other Depot crate depends on `depot-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (BLAKE3 hash)
//! - [`TagPath`] — Hierarchical tag name (`webapps/foo`)

pub mod error;
pub mod object;
pub mod path;

pub use error::TypeError;
pub use object::ObjectId;
pub use path::{Ancestors, TagPath};
