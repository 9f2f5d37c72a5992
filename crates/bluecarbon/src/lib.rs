//! `bluecarbon` - offline-first field records for blue-carbon projects
//!
//! This library keeps project registrations, monitoring (MRV) observations and
//! credit ledger entries in a local durable store, and pushes them to a remote
//! authority whenever the device is online.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod factory;
pub mod logging;
pub mod model;
pub mod remote;
pub mod service;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::Config;
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use service::{DashboardSummary, FieldService};
pub use storage::{DurableStorage, MemoryStorage, SqliteStorage, StorageStats};
pub use store::RecordStore;
pub use sync::{SyncCoordinator, SyncEvent, SyncReport, SyncSettings};
