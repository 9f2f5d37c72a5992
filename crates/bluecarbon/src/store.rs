//! The record store: in-memory collections mirrored to durable storage.
//!
//! Each collection is held in memory as an ordered `Vec` behind its own async
//! mutex, so mutations to one collection never interleave. Every mutation
//! re-encodes and writes the whole collection before it returns; if that
//! write fails the in-memory change is undone, so the visible state never
//! contains records that are not on disk.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{CollectionKind, CreditLedgerEntry, MonitoringRecord, Project, Record};
use crate::storage::DurableStorage;

/// In-memory mirror of one persisted collection.
#[derive(Debug)]
pub struct Collection<T> {
    records: Mutex<Vec<T>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

/// Record types the store knows how to locate.
pub trait Stored: Record {
    /// The in-memory collection holding this record type.
    fn collection(store: &RecordStore) -> &Collection<Self>;
}

impl Stored for Project {
    fn collection(store: &RecordStore) -> &Collection<Self> {
        &store.projects
    }
}

impl Stored for MonitoringRecord {
    fn collection(store: &RecordStore) -> &Collection<Self> {
        &store.monitoring
    }
}

impl Stored for CreditLedgerEntry {
    fn collection(store: &RecordStore) -> &Collection<Self> {
        &store.credits
    }
}

/// Owner of the three record collections and of the durable storage.
///
/// Other components receive an `Arc<RecordStore>` and go through these
/// accessors; nothing else touches the storage backend.
#[derive(Debug)]
pub struct RecordStore {
    storage: Arc<dyn DurableStorage>,
    projects: Collection<Project>,
    monitoring: Collection<MonitoringRecord>,
    credits: Collection<CreditLedgerEntry>,
}

impl RecordStore {
    /// Restore every collection from `storage`.
    ///
    /// Fails soft: a collection whose payload is missing, unreadable, or
    /// corrupt starts empty and the others load normally.
    pub async fn load(storage: Arc<dyn DurableStorage>) -> Self {
        let store = Self {
            storage,
            projects: Collection::default(),
            monitoring: Collection::default(),
            credits: Collection::default(),
        };

        store.restore::<Project>().await;
        store.restore::<MonitoringRecord>().await;
        store.restore::<CreditLedgerEntry>().await;
        store
    }

    async fn restore<T: Stored>(&self) {
        let key = T::KIND.key();
        let restored: Vec<T> = match self.storage.read(key) {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(records) => records,
                Err(e) => {
                    warn!(collection = key, error = %e, "Corrupt collection payload, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(collection = key, error = %e, "Could not read collection, starting empty");
                Vec::new()
            }
        };

        info!(collection = key, records = restored.len(), "Restored collection");
        *T::collection(self).records.lock().await = restored;
    }

    /// Snapshot of a collection in insertion order.
    pub async fn get_all<T: Stored>(&self) -> Vec<T> {
        T::collection(self).records.lock().await.clone()
    }

    /// Look up one record by identifier.
    pub async fn get<T: Stored>(&self, id: u64) -> Option<T> {
        T::collection(self)
            .records
            .lock()
            .await
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    /// Number of records in a collection.
    pub async fn len<T: Stored>(&self) -> usize {
        T::collection(self).records.lock().await.len()
    }

    /// Records not yet acknowledged by the remote authority, in insertion order.
    pub async fn pending<T: Stored>(&self) -> Vec<T> {
        T::collection(self)
            .records
            .lock()
            .await
            .iter()
            .filter(|record| !record.is_synced())
            .cloned()
            .collect()
    }

    /// Append a record, assigning it the next identifier.
    ///
    /// Any identifier already on `record` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the durable write fails; the
    /// collection is then unchanged.
    pub async fn append<T: Stored>(&self, record: T) -> Result<T> {
        self.append_with(|_| Ok(record)).await
    }

    /// Build and append a record under the collection lock.
    ///
    /// `build` receives the identifier the new record will get
    /// (collection length + 1). If it fails, nothing is appended.
    ///
    /// # Errors
    ///
    /// Returns the builder's error, or [`Error::Persistence`] if the durable
    /// write fails.
    pub async fn append_with<T, F>(&self, build: F) -> Result<T>
    where
        T: Stored,
        F: FnOnce(u64) -> Result<T>,
    {
        let mut records = T::collection(self).records.lock().await;
        let id = next_id(records.len());

        let mut record = build(id)?;
        record.assign_id(id);
        records.push(record.clone());

        if let Err(e) = self.persist(T::KIND, &records) {
            records.pop();
            return Err(e);
        }

        debug!(collection = T::KIND.key(), id, "Appended record");
        Ok(record)
    }

    /// Replace a record with a transformed copy of itself.
    ///
    /// The updater cannot change the identifier, and cannot clear the synced
    /// flag once it has been set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has `id`, the updater's error
    /// if it rejects the change, or [`Error::Persistence`] if the durable write
    /// fails; in every case the collection is unchanged.
    pub async fn replace<T, F>(&self, id: u64, update: F) -> Result<T>
    where
        T: Stored,
        F: FnOnce(&T) -> Result<T>,
    {
        let mut records = T::collection(self).records.lock().await;
        let index = records
            .iter()
            .position(|record| record.id() == id)
            .ok_or(Error::NotFound {
                collection: T::KIND.key(),
                id,
            })?;

        let mut updated = update(&records[index])?;
        updated.assign_id(id);
        if records[index].is_synced() {
            updated.mark_synced();
        }

        let previous = std::mem::replace(&mut records[index], updated.clone());
        if let Err(e) = self.persist(T::KIND, &records) {
            records[index] = previous;
            return Err(e);
        }

        debug!(collection = T::KIND.key(), id, "Replaced record");
        Ok(updated)
    }

    /// Mark one record as acknowledged by the remote authority.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::replace`].
    pub async fn mark_synced<T: Stored>(&self, id: u64) -> Result<T> {
        self.replace(id, |record: &T| {
            let mut record = record.clone();
            record.mark_synced();
            Ok(record)
        })
        .await
    }

    /// Number of unsynced records across every collection.
    pub async fn pending_count(&self) -> usize {
        self.pending::<Project>().await.len()
            + self.pending::<MonitoringRecord>().await.len()
            + self.pending::<CreditLedgerEntry>().await.len()
    }

    fn persist<T: Record>(&self, kind: CollectionKind, records: &[T]) -> Result<()> {
        let key = kind.key();
        let payload = serde_json::to_string(records)
            .map_err(|e| Error::persistence(key, format!("encoding failed: {e}")))?;
        self.storage
            .write(key, &payload, records.len())
            .map_err(|e| {
                warn!(collection = key, error = %e, "Durable write failed, rolling back");
                Error::persistence(key, e.to_string())
            })
    }
}

/// Identifier for the next record in a collection of `len` records.
///
/// Position-derived; valid only because records are never deleted.
fn next_id(len: usize) -> u64 {
    u64::try_from(len).map_or(u64::MAX, |n| n.saturating_add(1))
}
