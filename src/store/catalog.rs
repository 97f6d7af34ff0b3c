//! SQLite catalog of blob names, references, and metadata
//!
//! One row per stored blob. The reference is the de-facto primary key;
//! names carry no uniqueness constraint and may be empty. Metadata is kept
//! as JSON text in a nullable column.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Catalog schema, applied on every open
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    name TEXT,
    reference TEXT,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_metadata_name ON metadata (name);
CREATE INDEX IF NOT EXISTS idx_metadata_reference ON metadata (reference);
CREATE INDEX IF NOT EXISTS idx_metadata_name_reference ON metadata (name, reference);
"#;

/// A catalog row with its metadata decoded
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub reference: String,
    pub metadata: Option<Value>,
}

impl Entry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let raw: Option<String> = row.get("metadata")?;
        Ok(Entry {
            name: row.get("name")?,
            reference: row.get("reference")?,
            metadata: raw.and_then(decode_metadata),
        })
    }
}

/// Decode stored metadata text; undecodable text reads as absent
fn decode_metadata(raw: String) -> Option<Value> {
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "discarding undecodable catalog metadata");
            None
        }
    }
}

/// The embedded catalog database
///
/// `rusqlite::Connection` is not `Sync`, so the connection sits behind a
/// mutex. Callers serialize whole operations with the engine lock; this
/// mutex only satisfies the sharing rules beneath it.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open or create the catalog database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening catalog");

        let conn = Connection::open(path)?;
        // Patterns promise literal matching, which SQLite's ASCII-folding
        // LIKE default would break.
        conn.execute_batch("PRAGMA case_sensitive_like = ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Catalog {
            conn: Mutex::new(conn),
        })
    }

    /// Close the underlying connection, surfacing any shutdown error
    pub fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, err)| Error::Catalog(err))
    }

    /// Insert a row; `metadata` is already-encoded JSON text or NULL
    pub fn insert(&self, name: &str, reference: &str, metadata: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO metadata (name, reference, metadata) VALUES (?1, ?2, ?3)",
            params![name, reference, metadata],
        )?;
        Ok(())
    }

    /// Fetch the row with this exact reference
    pub fn lookup_by_reference(&self, reference: &str) -> Result<Option<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name, reference, metadata FROM metadata WHERE reference = ?1")?;
        let mut rows = stmt.query(params![reference])?;
        match rows.next()? {
            Some(row) => Ok(Some(Entry::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Fetch an arbitrary row with this exact name
    pub fn lookup_by_name(&self, name: &str) -> Result<Option<Entry>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT name, reference, metadata FROM metadata WHERE name = ?1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(Entry::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Delete the row with this reference; absent rows are not an error
    pub fn delete_by_reference(&self, reference: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM metadata WHERE reference = ?1",
            params![reference],
        )?;
        Ok(())
    }

    /// Delete every row whose name matches the pattern
    pub fn delete_by_pattern(&self, prefix: &str, postfix: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM metadata WHERE name LIKE ?1 ESCAPE '\\'",
            params![like_pattern(prefix, postfix)],
        )?;
        Ok(())
    }

    /// Fetch every row whose name matches the pattern, in no particular order
    pub fn scan_by_pattern(&self, prefix: &str, postfix: &str) -> Result<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, reference, metadata FROM metadata WHERE name LIKE ?1 ESCAPE '\\'",
        )?;
        let entries = stmt
            .query_map(params![like_pattern(prefix, postfix)], Entry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// References of every row whose name matches the pattern
    pub fn scan_references_by_pattern(
        &self,
        prefix: &str,
        postfix: &str,
    ) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT reference FROM metadata WHERE name LIKE ?1 ESCAPE '\\'")?;
        let references = stmt
            .query_map(params![like_pattern(prefix, postfix)], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(references)
    }

    /// Rename the row with this reference; zero rows affected is success
    pub fn update_name(&self, reference: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE metadata SET name = ?1 WHERE reference = ?2",
            params![name, reference],
        )?;
        Ok(())
    }

    /// Replace the metadata of the row with this reference
    pub fn update_metadata(&self, reference: &str, metadata: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE metadata SET metadata = ?1 WHERE reference = ?2",
            params![metadata, reference],
        )?;
        Ok(())
    }
}

/// Build the LIKE pattern: literal prefix, any run, literal postfix
///
/// `%`, `_`, and `\` in the caller's text are escaped so they match
/// themselves; only the run between prefix and postfix is a wildcard.
fn like_pattern(prefix: &str, postfix: &str) -> String {
    format!("{}%{}", escape_like(prefix), escape_like(postfix))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
