//! # blobdepot
//!
//! An embeddable blob store with a SQLite catalog and sharded on-disk layout.
//!
//! blobdepot persists opaque binary payloads on the local filesystem while
//! keeping a queryable catalog of names, references, and JSON metadata
//! beside them, giving applications simple object storage with rename,
//! prefix/postfix search, and arbitrary metadata, without running a
//! separate storage service.
//!
//! ## Core Concepts
//!
//! - **References**: Generated 50-char hex identifiers, never content-derived
//! - **Catalog**: Embedded SQLite index of names, references, and metadata
//! - **Blobs**: Raw bytes under a three-level sharded directory tree
//! - **Nodes**: Detached snapshot handles with capability-probed blob I/O
//!
//! ## Example
//!
//! ```ignore
//! use blobdepot::{FileStorage, Node, Storage};
//! use std::io::Write;
//!
//! let storage = FileStorage::new("./depot")?;
//! storage.open()?;
//!
//! let node = storage.create("cats", None)?;
//! if let Some(writable) = node.as_writable() {
//!     writable.writer()?.write_all(b"meow")?;
//! }
//!
//! storage.close()?;
//! ```

pub mod reference;
pub mod storage;
pub mod store;

mod error;
mod file_storage;

pub use error::{Error, Result};
pub use file_storage::{FileNode, FileStorage};
pub use reference::{RandomHexSource, ReferenceSource, SequenceSource};
pub use storage::{
    FlagWritable, Mutable, Node, Pathable, Readable, Storage, Writable, WriteFlags,
};

/// File name of the catalog database under the engine root
pub const CATALOG_FILE_NAME: &str = "metadata.db";

/// Random bytes per generated reference (two hex characters each)
pub const REFERENCE_BYTE_LENGTH: usize = 25;
