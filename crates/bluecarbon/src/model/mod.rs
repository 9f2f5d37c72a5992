//! Domain records held by the local store.
//!
//! Three collections exist: registered projects, field monitoring (MRV)
//! records, and credit ledger entries. Each record type implements [`Record`],
//! which ties it to its collection and exposes the synchronization flag.

mod credit;
mod monitoring;
mod project;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use credit::{CreditLedgerEntry, CreditOperation};
pub use monitoring::{Measurements, MonitoringRecord, Species};
pub use project::{Coordinates, EcosystemType, Methodology, Project, ProjectStatus};

/// The named collections persisted by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    /// Registered projects.
    Projects,
    /// Monitoring (MRV) records.
    MonitoringRecords,
    /// Credit ledger entries.
    Credits,
}

impl CollectionKind {
    /// All collections, in sync sweep order.
    pub const ALL: [CollectionKind; 3] = [Self::Projects, Self::MonitoringRecords, Self::Credits];

    /// The durable storage key of this collection.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::MonitoringRecords => "mrvData",
            Self::Credits => "credits",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A record that lives in one of the store's collections.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The collection this record type belongs to.
    const KIND: CollectionKind;

    /// Store-assigned identifier.
    fn id(&self) -> u64;

    /// Set the identifier. Only the record store calls this.
    fn assign_id(&mut self, id: u64);

    /// Whether the remote authority has acknowledged this record.
    fn is_synced(&self) -> bool;

    /// Flag the record as acknowledged. This never reverts.
    fn mark_synced(&mut self);

    /// BLAKE3 digest of the record content, excluding the synced flag.
    ///
    /// Sent with every push so the remote can treat repeats as the same intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    fn content_digest(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("synced");
        }
        let canonical = serde_json::to_vec(&value)?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }
}
