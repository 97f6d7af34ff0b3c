//! Sharded on-disk blob store
//!
//! Blobs live under a three-level fan-out derived from the reference:
//! `<root>/<ref[0..2]>/<ref[2..4]>/<ref[4..6]>/<ref>`. The fan-out keeps
//! directory entry counts manageable for large stores.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use crate::storage::WriteFlags;
use crate::{Error, Result};

/// Blob store rooted at a directory
///
/// Purely path arithmetic and file handles; the store holds no state and
/// takes no locks. Callers coordinate concurrent mutation.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store rooted at `root`; nothing is touched on disk yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ContentStore { root: root.into() }
    }

    /// Path of the blob for `reference`
    ///
    /// References too short to shard (or cut off a character boundary)
    /// land directly under the root rather than panicking.
    pub fn blob_path(&self, reference: &str) -> PathBuf {
        match (
            reference.get(0..2),
            reference.get(2..4),
            reference.get(4..6),
        ) {
            (Some(a), Some(b), Some(c)) => self.root.join(a).join(b).join(c).join(reference),
            _ => self.root.join(reference),
        }
    }

    /// Open the blob for reading
    pub fn open_reader(&self, reference: &str) -> Result<File> {
        let path = self.blob_path(reference);
        File::open(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::BlobNotFound(reference.to_string())
            } else {
                Error::Io(err)
            }
        })
    }

    /// Open the blob for writing, creating it and discarding prior content
    pub fn open_writer(&self, reference: &str) -> Result<File> {
        self.open_writer_with(reference, WriteFlags::default())
    }

    /// Open the blob for writing with explicit flags
    ///
    /// Shard directories are created as needed. Flag combinations the
    /// platform rejects (truncate with append) surface as the open error.
    pub fn open_writer_with(&self, reference: &str, flags: WriteFlags) -> Result<File> {
        let path = self.blob_path(reference);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(flags.create)
            .truncate(flags.truncate)
            .append(flags.append)
            .open(&path)?;
        Ok(file)
    }

    /// Remove the blob, best-effort
    ///
    /// Missing blobs are silent, other removal failures are logged and
    /// swallowed. Shard directories left empty are pruned bottom-up.
    pub fn remove(&self, reference: &str) {
        let path = self.blob_path(reference);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %err, "blob removal failed");
            }
        }

        // An Err from remove_dir means the directory is shared or already
        // gone; either way pruning stops there.
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}
