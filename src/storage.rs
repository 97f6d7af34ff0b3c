//! Storage and node trait definitions

use std::io::{Read, Write};
use std::path::PathBuf;

use serde_json::Value;

use crate::Result;

/// Trait for blob storage engines
///
/// Implementations can keep blobs:
/// - On a local filesystem with an embedded catalog (`FileStorage`)
/// - In memory, for tests
/// - On any backend that can satisfy the reference/name contract
///
/// Engines start closed. Every operation other than `open` returns
/// `Error::NotOpen` until `open` succeeds, and again after `close`.
pub trait Storage: Send + Sync {
    /// Open the engine, creating backing state as needed
    fn open(&self) -> Result<()>;

    /// Close the engine and release backing state
    fn close(&self) -> Result<()>;

    /// Insert a catalog entry under a freshly generated reference
    ///
    /// No blob content is written; the blob comes into existence on the
    /// first write through the returned node.
    fn create(&self, name: &str, metadata: Option<Value>) -> Result<Box<dyn Node>>;

    /// Remove the catalog entry and blob for a reference
    ///
    /// Unknown references succeed, so deletion is idempotent.
    fn delete(&self, reference: &str) -> Result<()>;

    /// Remove every entry whose name matches the pattern, blobs included
    ///
    /// A name matches when it starts with `prefix`, ends with `postfix`,
    /// and has any run of characters (possibly empty) in between. Both
    /// arguments match literally; they carry no wildcard syntax.
    fn delete_by(&self, prefix: &str, postfix: &str) -> Result<()>;

    /// Fetch the entry with this exact reference
    fn get_by_reference(&self, reference: &str) -> Result<Option<Box<dyn Node>>>;

    /// Fetch an entry with this exact name
    ///
    /// Names are not unique; when several entries share the name, which
    /// one is returned is unspecified.
    fn get_by_name(&self, name: &str) -> Result<Option<Box<dyn Node>>>;

    /// Whether any entry has this exact name
    fn exists_by_name(&self, name: &str) -> Result<bool>;

    /// Whether an entry has this exact reference
    fn exists_by_reference(&self, reference: &str) -> Result<bool>;

    /// Fetch every entry whose name matches the pattern, in no particular order
    fn list_by(&self, prefix: &str, postfix: &str) -> Result<Vec<Box<dyn Node>>>;

    /// References of every entry whose name matches the pattern
    fn list_references(&self, prefix: &str, postfix: &str) -> Result<Vec<String>>;
}

/// A handle to a stored blob and its catalog entry
///
/// Nodes are detached snapshots: their fields reflect the catalog at fetch
/// time, and mutations through `Mutable` refresh only the node they ran on.
/// Other nodes for the same entry keep their stale view until re-fetched.
///
/// Extended behavior is probed through the `as_*` methods. A `None` means
/// the backend does not support that capability, never that something
/// failed.
pub trait Node: Send {
    /// Unique reference identifying the blob
    fn reference(&self) -> &str;

    /// Human-readable name (not necessarily unique, may be empty)
    fn name(&self) -> &str;

    /// Decoded metadata, if any was stored
    fn metadata(&self) -> Option<&Value>;

    /// Rename and metadata updates, if supported
    fn as_mutable(&mut self) -> Option<&mut dyn Mutable> {
        None
    }

    /// Direct filesystem access to the blob, if supported
    fn as_pathable(&self) -> Option<&dyn Pathable> {
        None
    }

    /// Streaming reads, if supported
    fn as_readable(&self) -> Option<&dyn Readable> {
        None
    }

    /// Streaming writes, if supported
    fn as_writable(&self) -> Option<&dyn Writable> {
        None
    }

    /// Flag-controlled writes, if supported
    fn as_flag_writable(&self) -> Option<&dyn FlagWritable> {
        None
    }
}

/// Rename and metadata updates on a node
pub trait Mutable {
    /// Rename the catalog entry and refresh this node's cached name
    fn set_name(&mut self, name: &str) -> Result<()>;

    /// Replace the stored metadata; `None` clears it
    fn set_metadata(&mut self, metadata: Option<Value>) -> Result<()>;
}

/// Location of a node's blob on the local filesystem
pub trait Pathable {
    /// Path of the blob file (it may not exist until the first write)
    fn path(&self) -> PathBuf;
}

/// Streaming reads of a node's blob
pub trait Readable {
    /// Open the blob for reading
    ///
    /// Returns `Error::BlobNotFound` when nothing has been written yet.
    fn reader(&self) -> Result<Box<dyn Read>>;
}

/// Streaming writes of a node's blob
pub trait Writable {
    /// Open the blob for writing, creating it and discarding prior content
    fn writer(&self) -> Result<Box<dyn Write>>;
}

/// Streaming writes with caller-controlled open behavior
pub trait FlagWritable {
    /// Open the blob for writing with explicit flags
    fn flag_writer(&self, flags: WriteFlags) -> Result<Box<dyn Write>>;
}

/// Open flags for `FlagWritable::flag_writer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteFlags {
    /// Create the blob file if it does not exist
    pub create: bool,
    /// Discard existing content on open
    pub truncate: bool,
    /// Position every write at the end of the file
    pub append: bool,
}

impl WriteFlags {
    /// Create-if-missing append mode
    pub fn append() -> Self {
        WriteFlags {
            create: true,
            truncate: false,
            append: true,
        }
    }
}

impl Default for WriteFlags {
    /// Equivalent to `Writable::writer`: create and truncate
    fn default() -> Self {
        WriteFlags {
            create: true,
            truncate: true,
            append: false,
        }
    }
}
