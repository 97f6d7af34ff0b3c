//! High-level file storage engine
//!
//! This module provides the main entry point: a filesystem-backed engine
//! coupling the sharded blob tree with the SQLite catalog under one root
//! directory.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::reference::{RandomHexSource, ReferenceSource};
use crate::storage::{
    FlagWritable, Mutable, Node, Pathable, Readable, Storage, Writable, WriteFlags,
};
use crate::store::{Catalog, ContentStore, Entry};
use crate::{Error, Result, CATALOG_FILE_NAME, REFERENCE_BYTE_LENGTH};

/// Shared engine state
struct Inner {
    /// Engine root; catalog and shard tree live beneath it
    root: PathBuf,
    /// Blob tree under the root
    content: ContentStore,
    /// Reference generator, serialized across creates
    source: Mutex<Box<dyn ReferenceSource>>,
    /// Open/closed state; holds the catalog handle while open
    catalog: RwLock<Option<Catalog>>,
}

/// Filesystem-backed storage engine
///
/// Provides:
/// - Named blobs under generated references, with optional JSON metadata
/// - Literal prefix/postfix name search
/// - Streaming blob I/O through capability-probed nodes
///
/// Clones share the engine state, so one engine can serve many threads.
/// Lookups take a shared lock; mutations and the open/close transitions
/// take an exclusive one. Engines start closed.
///
/// Single-process only: the catalog is an embedded SQLite file and two
/// processes on one root will corrupt it.
#[derive(Clone)]
pub struct FileStorage {
    inner: Arc<Inner>,
}

impl FileStorage {
    /// Create an engine rooted at `path`
    ///
    /// The root is resolved to an absolute path immediately; nothing
    /// touches the disk until [`Storage::open`].
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(path)?;
        Ok(FileStorage {
            inner: Arc::new(Inner {
                content: ContentStore::new(root.clone()),
                root,
                source: Mutex::new(Box::new(RandomHexSource::new())),
                catalog: RwLock::new(None),
            }),
        })
    }

    /// Swap the reference source
    ///
    /// Mostly useful for tests that need deterministic references.
    pub fn with_source(self, source: impl ReferenceSource + 'static) -> Self {
        *self.inner.source.lock() = Box::new(source);
        self
    }

    /// Root directory of the engine
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Create an entry whose metadata is any serializable value
    ///
    /// Values that refuse to serialize are stored as a null column and the
    /// create still succeeds; the returned node then carries no metadata.
    pub fn create_with<M: Serialize>(
        &self,
        name: &str,
        metadata: Option<&M>,
    ) -> Result<FileNode> {
        let value = match metadata.map(serde_json::to_value).transpose() {
            Ok(value) => value,
            Err(err) => {
                warn!(name, error = %err, "metadata not serializable, storing null");
                None
            }
        };
        self.insert_entry(name, value)
    }

    fn insert_entry(&self, name: &str, metadata: Option<Value>) -> Result<FileNode> {
        let encoded = match &metadata {
            Some(value) => match serde_json::to_string(value) {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(name, error = %err, "metadata not encodable, storing null");
                    None
                }
            },
            None => None,
        };

        let guard = self.inner.catalog.write();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
        let reference = self.inner.source.lock().generate(REFERENCE_BYTE_LENGTH);
        catalog.insert(name, &reference, encoded.as_deref())?;
        debug!(name, reference = %reference, "created entry");

        Ok(FileNode {
            inner: Arc::clone(&self.inner),
            reference,
            name: name.to_string(),
            metadata,
        })
    }

    fn node_from(&self, entry: Entry) -> Box<dyn Node> {
        Box::new(FileNode {
            inner: Arc::clone(&self.inner),
            reference: entry.reference,
            name: entry.name,
            metadata: entry.metadata,
        })
    }
}

impl Storage for FileStorage {
    // === Lifecycle ===

    fn open(&self) -> Result<()> {
        let mut guard = self.inner.catalog.write();
        if guard.is_some() {
            return Err(Error::AlreadyOpen);
        }

        fs::create_dir_all(&self.inner.root)?;
        let catalog = Catalog::open(self.inner.root.join(CATALOG_FILE_NAME))?;
        *guard = Some(catalog);

        info!(root = %self.inner.root.display(), "storage opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.inner.catalog.write();
        let catalog = guard.take().ok_or(Error::NotOpen)?;
        catalog.close()?;

        info!(root = %self.inner.root.display(), "storage closed");
        Ok(())
    }

    // === Mutation ===

    fn create(&self, name: &str, metadata: Option<Value>) -> Result<Box<dyn Node>> {
        Ok(Box::new(self.insert_entry(name, metadata)?))
    }

    fn delete(&self, reference: &str) -> Result<()> {
        let guard = self.inner.catalog.write();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;

        catalog.delete_by_reference(reference)?;
        self.inner.content.remove(reference);

        debug!(reference = %reference, "deleted entry");
        Ok(())
    }

    fn delete_by(&self, prefix: &str, postfix: &str) -> Result<()> {
        let guard = self.inner.catalog.write();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;

        // Snapshot first: the rows are gone once the delete runs.
        let references = catalog.scan_references_by_pattern(prefix, postfix)?;
        catalog.delete_by_pattern(prefix, postfix)?;
        for reference in &references {
            self.inner.content.remove(reference);
        }

        debug!(prefix, postfix, count = references.len(), "deleted entries by pattern");
        Ok(())
    }

    // === Lookup ===

    fn get_by_reference(&self, reference: &str) -> Result<Option<Box<dyn Node>>> {
        let guard = self.inner.catalog.read();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
        let entry = catalog.lookup_by_reference(reference)?;
        Ok(entry.map(|entry| self.node_from(entry)))
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Box<dyn Node>>> {
        let guard = self.inner.catalog.read();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
        let entry = catalog.lookup_by_name(name)?;
        Ok(entry.map(|entry| self.node_from(entry)))
    }

    fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.get_by_name(name)?.is_some())
    }

    fn exists_by_reference(&self, reference: &str) -> Result<bool> {
        Ok(self.get_by_reference(reference)?.is_some())
    }

    fn list_by(&self, prefix: &str, postfix: &str) -> Result<Vec<Box<dyn Node>>> {
        let guard = self.inner.catalog.read();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
        let entries = catalog.scan_by_pattern(prefix, postfix)?;
        Ok(entries
            .into_iter()
            .map(|entry| self.node_from(entry))
            .collect())
    }

    fn list_references(&self, prefix: &str, postfix: &str) -> Result<Vec<String>> {
        let guard = self.inner.catalog.read();
        let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
        catalog.scan_references_by_pattern(prefix, postfix)
    }
}

/// Node handle returned by [`FileStorage`]
///
/// Carries a snapshot of the catalog row plus the engine handle for
/// capability I/O. Blob reads and writes go straight to the filesystem and
/// take no engine lock, so open streams keep working while other threads
/// mutate the catalog, and even after `close`.
pub struct FileNode {
    inner: Arc<Inner>,
    reference: String,
    name: String,
    metadata: Option<Value>,
}

impl FileNode {
    /// Replace the stored metadata with any serializable value
    ///
    /// Unlike [`FileStorage::create_with`], serialization failures here
    /// surface as errors and the catalog is left untouched.
    pub fn set_metadata_with<M: Serialize>(&mut self, metadata: Option<&M>) -> Result<()> {
        let value = metadata.map(serde_json::to_value).transpose()?;
        self.set_metadata(value)
    }
}

impl Node for FileNode {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    fn as_mutable(&mut self) -> Option<&mut dyn Mutable> {
        Some(self)
    }

    fn as_pathable(&self) -> Option<&dyn Pathable> {
        Some(self)
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        Some(self)
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        Some(self)
    }

    fn as_flag_writable(&self) -> Option<&dyn FlagWritable> {
        Some(self)
    }
}

impl Mutable for FileNode {
    fn set_name(&mut self, name: &str) -> Result<()> {
        {
            let guard = self.inner.catalog.write();
            let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
            catalog.update_name(&self.reference, name)?;
        }
        self.name = name.to_string();
        Ok(())
    }

    fn set_metadata(&mut self, metadata: Option<Value>) -> Result<()> {
        let encoded = match &metadata {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        {
            let guard = self.inner.catalog.write();
            let catalog = guard.as_ref().ok_or(Error::NotOpen)?;
            catalog.update_metadata(&self.reference, encoded.as_deref())?;
        }
        self.metadata = metadata;
        Ok(())
    }
}

impl Pathable for FileNode {
    fn path(&self) -> PathBuf {
        self.inner.content.blob_path(&self.reference)
    }
}

impl Readable for FileNode {
    fn reader(&self) -> Result<Box<dyn Read>> {
        let file = self.inner.content.open_reader(&self.reference)?;
        Ok(Box::new(file))
    }
}

impl Writable for FileNode {
    fn writer(&self) -> Result<Box<dyn Write>> {
        let file = self.inner.content.open_writer(&self.reference)?;
        Ok(Box::new(file))
    }
}

impl FlagWritable for FileNode {
    fn flag_writer(&self, flags: WriteFlags) -> Result<Box<dyn Write>> {
        let file = self.inner.content.open_writer_with(&self.reference, flags)?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::SequenceSource;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn open_storage(dir: &TempDir) -> FileStorage {
        let storage = FileStorage::new(dir.path().join("store")).unwrap();
        storage.open().unwrap();
        storage
    }

    #[test]
    fn test_open_close_lifecycle() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("store")).unwrap();

        storage.open().unwrap();
        assert!(matches!(storage.open(), Err(Error::AlreadyOpen)));

        storage.close().unwrap();
        assert!(matches!(storage.close(), Err(Error::NotOpen)));
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let metadata = json!({"kind": "text", "tags": ["a", "b"]});
        let created = storage.create("notes", Some(metadata.clone())).unwrap();

        let by_name = storage.get_by_name("notes").unwrap().unwrap();
        assert_eq!(by_name.reference(), created.reference());
        assert_eq!(by_name.metadata(), Some(&metadata));

        let by_reference = storage
            .get_by_reference(created.reference())
            .unwrap()
            .unwrap();
        assert_eq!(by_reference.name(), "notes");
    }

    #[test]
    fn test_operations_require_open() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("store")).unwrap();

        assert!(matches!(storage.create("x", None), Err(Error::NotOpen)));
        assert!(matches!(storage.delete("x"), Err(Error::NotOpen)));
        assert!(matches!(storage.delete_by("x", ""), Err(Error::NotOpen)));
        assert!(matches!(storage.get_by_name("x"), Err(Error::NotOpen)));
        assert!(matches!(storage.get_by_reference("x"), Err(Error::NotOpen)));
        assert!(matches!(storage.exists_by_name("x"), Err(Error::NotOpen)));
        assert!(matches!(storage.list_by("", ""), Err(Error::NotOpen)));
        assert!(matches!(storage.list_references("", ""), Err(Error::NotOpen)));
    }

    #[test]
    fn test_injected_source_controls_references() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("store"))
            .unwrap()
            .with_source(SequenceSource::new(["aabbcc01", "aabbcc02"]));
        storage.open().unwrap();

        let first = storage.create("one", None).unwrap();
        let second = storage.create("two", None).unwrap();
        assert_eq!(first.reference(), "aabbcc01");
        assert_eq!(second.reference(), "aabbcc02");
    }

    #[test]
    fn test_node_blob_io() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let node = storage.create("cats", None).unwrap();

        // Write
        let mut writer = node.as_writable().unwrap().writer().unwrap();
        writer.write_all(b"meow").unwrap();
        drop(writer);

        // Read back
        let mut contents = String::new();
        node.as_readable()
            .unwrap()
            .reader()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "meow");

        // The blob sits at the advertised path
        let path = node.as_pathable().unwrap().path();
        assert!(path.exists());
        assert!(path.starts_with(storage.root()));
    }

    #[test]
    fn test_rename_updates_catalog() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let mut node = storage.create("before", None).unwrap();
        node.as_mutable().unwrap().set_name("after").unwrap();
        assert_eq!(node.name(), "after");

        assert!(storage.get_by_name("before").unwrap().is_none());
        let fetched = storage.get_by_name("after").unwrap().unwrap();
        assert_eq!(fetched.reference(), node.reference());
    }

    #[test]
    fn test_metadata_set_and_clear() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let mut node = storage.create("thing", Some(json!("value"))).unwrap();

        node.as_mutable().unwrap().set_metadata(None).unwrap();
        assert!(node.metadata().is_none());
        let fetched = storage.get_by_name("thing").unwrap().unwrap();
        assert!(fetched.metadata().is_none());

        node.as_mutable()
            .unwrap()
            .set_metadata(Some(json!(9.1)))
            .unwrap();
        let fetched = storage.get_by_name("thing").unwrap().unwrap();
        assert_eq!(fetched.metadata(), Some(&json!(9.1)));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(
            &self,
            _serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refuses to serialize"))
        }
    }

    #[test]
    fn test_unserializable_create_metadata_stored_as_null() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let node = storage.create_with("broken", Some(&Unserializable)).unwrap();
        assert!(node.metadata().is_none());

        let fetched = storage.get_by_name("broken").unwrap().unwrap();
        assert!(fetched.metadata().is_none());
    }

    #[test]
    fn test_unserializable_metadata_update_is_an_error() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let mut node = storage.create_with("kept", Some(&json!(1))).unwrap();
        let result = node.set_metadata_with(Some(&Unserializable));
        assert!(matches!(result, Err(Error::Serialization(_))));

        // The stored value is untouched
        let fetched = storage.get_by_name("kept").unwrap().unwrap();
        assert_eq!(fetched.metadata(), Some(&json!(1)));
    }

    #[test]
    fn test_node_mutation_requires_open_engine() {
        let dir = tempdir().unwrap();
        let storage = open_storage(&dir);

        let mut node = storage.create("stale", None).unwrap();
        storage.close().unwrap();

        assert!(matches!(
            node.as_mutable().unwrap().set_name("x"),
            Err(Error::NotOpen)
        ));
        assert!(matches!(
            node.as_mutable().unwrap().set_metadata(None),
            Err(Error::NotOpen)
        ));
    }
}
