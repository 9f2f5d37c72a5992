//! Durable storage backends.
//!
//! The record store persists each collection wholesale under its own key.
//! [`DurableStorage`] is the seam: [`SqliteStorage`] is the on-device backend,
//! [`MemoryStorage`] is a volatile backend with write-failure injection used by
//! tests and dry runs.

pub mod migrations;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Key-value persistence of whole collection payloads.
pub trait DurableStorage: Send + Sync + std::fmt::Debug {
    /// Read the payload stored under `key`, `None` if nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the payload stored under `key`.
    ///
    /// Returns only after the write is durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the write did not complete.
    fn write(&self, key: &str, payload: &str, record_count: usize) -> Result<()>;
}

/// `SQLite`-backed durable storage.
#[derive(Debug)]
pub struct SqliteStorage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// then migrates the schema to the current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // Full sync: a successful write must survive power loss in the field
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        migrations::initialize_schema(&mut conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&mut conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("database connection lock poisoned"))
    }

    /// Per-collection statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, record_count, updated_at, length(value) FROM collections ORDER BY key",
        )?;
        let collections = stmt
            .query_map([], |row| {
                Ok(CollectionStats {
                    key: row.get(0)?,
                    record_count: row.get(1)?,
                    updated_at: row.get(2)?,
                    payload_bytes: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            collections,
            db_size_bytes,
        })
    }
}

impl DurableStorage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let payload = conn
            .query_row(schema::SELECT_COLLECTION, [key], |row| row.get(0))
            .optional()?;
        Ok(payload)
    }

    fn write(&self, key: &str, payload: &str, record_count: usize) -> Result<()> {
        let count = i64::try_from(record_count).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        conn.execute(
            schema::UPSERT_COLLECTION,
            params![key, payload, Utc::now().to_rfc3339(), count],
        )?;
        debug!(key, records = record_count, "Persisted collection");
        Ok(())
    }
}

/// Statistics about one persisted collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    /// Storage key.
    pub key: String,
    /// Number of records in the last write.
    pub record_count: i64,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
    /// Size of the encoded payload.
    pub payload_bytes: i64,
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Per-collection details, ordered by key.
    pub collections: Vec<CollectionStats>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Volatile storage backend.
///
/// Writes can be made to fail on demand to exercise rollback paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    failing_key: Mutex<Option<String>>,
}

impl MemoryStorage {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes to one key fail, leaving other keys writable.
    ///
    /// `None` clears the failure.
    pub fn set_failing_key(&self, key: Option<&str>) {
        *self
            .failing_key
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = key.map(str::to_string);
    }

    /// Store a raw payload, bypassing any encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry map lock is poisoned.
    pub fn insert_raw(&self, key: &str, payload: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::internal("memory storage lock poisoned"))
    }
}

impl DurableStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, payload: &str, _record_count: usize) -> Result<()> {
        let key_fails = self
            .failing_key
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_deref()
            == Some(key);
        if key_fails || self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("injected write failure")));
        }
        self.lock()?.insert(key.to_string(), payload.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        assert!(SqliteStorage::open_in_memory().is_ok());
    }

    #[test]
    fn test_read_missing_key() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.read("projects").unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write("projects", "[1,2]", 2).unwrap();
        assert_eq!(storage.read("projects").unwrap().as_deref(), Some("[1,2]"));
    }

    #[test]
    fn test_write_replaces_payload() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write("credits", "[]", 0).unwrap();
        storage.write("credits", "[{}]", 1).unwrap();
        assert_eq!(storage.read("credits").unwrap().as_deref(), Some("[{}]"));
    }

    #[test]
    fn test_keys_are_independent() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write("projects", "[\"p\"]", 1).unwrap();
        storage.write("mrvData", "[\"m\"]", 1).unwrap();
        assert_eq!(storage.read("projects").unwrap().as_deref(), Some("[\"p\"]"));
        assert_eq!(storage.read("mrvData").unwrap().as_deref(), Some("[\"m\"]"));
    }

    #[test]
    fn test_stats() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write("projects", "[1,2,3]", 3).unwrap();
        storage.write("credits", "[]", 0).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.db_size_bytes, 0);
        assert_eq!(stats.collections.len(), 2);
        assert_eq!(stats.collections[0].key, "credits");
        assert_eq!(stats.collections[1].record_count, 3);
        assert_eq!(stats.collections[1].payload_bytes, 7);
    }

    #[test]
    fn test_file_backed_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("bluecarbon_storage_{}", std::process::id()));
        let db_path = dir.join("nested").join("records.db");
        let _ = std::fs::remove_dir_all(&dir);

        {
            let storage = SqliteStorage::open(&db_path).unwrap();
            storage.write("projects", "[42]", 1).unwrap();
            assert_eq!(storage.path(), db_path);
        }

        let reopened = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(reopened.read("projects").unwrap().as_deref(), Some("[42]"));
        assert!(reopened.stats().unwrap().db_size_bytes > 0);

        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("projects").unwrap(), None);
        storage.write("projects", "[]", 0).unwrap();
        assert_eq!(storage.read("projects").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_memory_storage_injected_failure() {
        let storage = MemoryStorage::new();
        storage.write("projects", "[1]", 1).unwrap();

        storage.set_fail_writes(true);
        assert!(storage.write("projects", "[1,2]", 2).is_err());
        assert_eq!(storage.read("projects").unwrap().as_deref(), Some("[1]"));

        storage.set_fail_writes(false);
        assert!(storage.write("projects", "[1,2]", 2).is_ok());
    }

    #[test]
    fn test_memory_storage_insert_raw() {
        let storage = MemoryStorage::new();
        storage.insert_raw("mrvData", "{not json").unwrap();
        assert_eq!(storage.read("mrvData").unwrap().as_deref(), Some("{not json"));
    }
}
