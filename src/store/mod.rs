//! Persistence layer: the blob tree and its catalog
//!
//! Two independent halves live under one root directory: a sharded file
//! tree holding blob bytes and a SQLite catalog mapping names and metadata
//! to references. Coupling them is the engine's job.

mod catalog;
mod content;

pub use catalog::{Catalog, Entry};
pub use content::ContentStore;
