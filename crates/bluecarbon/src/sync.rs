//! Deferred push of locally created records to the remote authority.
//!
//! The coordinator pushes a record as soon as it is created when the device
//! is online, and otherwise leaves it pending for the next manual sweep.
//! A failed or timed-out push is not an error to the caller: the record just
//! stays pending. Only an acknowledged push flips the synced flag.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ SyncCoordinator                                        │
//! │  ├── store: Arc<RecordStore>                           │
//! │  ├── connectivity: ConnectivityMonitor                 │
//! │  ├── remote: Arc<dyn RemoteAuthority>                  │
//! │  ├── sweep_lock: one push path at a time               │
//! │  └── event_tx: broadcast::Sender<SyncEvent>            │
//! └────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::model::{CollectionKind, CreditLedgerEntry, MonitoringRecord, Project, Record};
use crate::remote::{PushEnvelope, RemoteAuthority};
use crate::store::{RecordStore, Stored};

/// Default capacity for the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default bound on a single push.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Events emitted while pushing records.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A manual sweep began.
    SweepStarted {
        /// Records pending when the sweep began.
        pending: usize,
    },
    /// The remote acknowledged a record.
    PushSucceeded {
        /// Collection of the record.
        collection: CollectionKind,
        /// Record identifier.
        id: u64,
    },
    /// A push was rejected or timed out; the record stays pending.
    PushFailed {
        /// Collection of the record.
        collection: CollectionKind,
        /// Record identifier.
        id: u64,
        /// Failure description.
        reason: String,
    },
    /// A manual sweep ended.
    SweepFinished(SyncReport),
}

/// Outcome of a manual sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pushes attempted.
    pub attempted: usize,
    /// Pushes acknowledged.
    pub succeeded: usize,
    /// Pushes rejected or timed out.
    pub failed: usize,
    /// Whether the sweep stopped early on request.
    pub cancelled: bool,
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempted, {} synced, {} failed",
            self.attempted, self.succeeded, self.failed
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// A push not answered within this bound counts as failed.
    pub push_timeout: Duration,
    /// Push new records right after they are stored.
    pub push_on_create: bool,
    /// Treat the connectivity default as offline until a real observation.
    pub require_initial_observation: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            push_on_create: true,
            require_initial_observation: false,
        }
    }
}

/// Cloneable request to stop a manual sweep.
///
/// The record currently in flight completes first. A request made while no
/// sweep is running, or while one is queued behind another push, stops the
/// next sweep before its first record. The request is cleared when a sweep
/// ends.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    signal: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Ask the running sweep to stop before its next record.
    pub fn cancel(&self) {
        self.signal.store(true, Ordering::SeqCst);
    }

    /// Check if a cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.signal.store(false, Ordering::SeqCst);
    }
}

/// Decides when records are pushed and records the outcome in the store.
#[derive(Debug)]
pub struct SyncCoordinator {
    store: Arc<RecordStore>,
    connectivity: ConnectivityMonitor,
    remote: Arc<dyn RemoteAuthority>,
    settings: SyncSettings,
    sweep_lock: Mutex<()>,
    cancel: CancelHandle,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    /// Create a coordinator over `store`.
    #[must_use]
    pub fn new(
        store: Arc<RecordStore>,
        connectivity: ConnectivityMonitor,
        remote: Arc<dyn RemoteAuthority>,
        settings: SyncSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            connectivity,
            remote,
            settings,
            sweep_lock: Mutex::new(()),
            cancel: CancelHandle::default(),
            event_tx,
        }
    }

    /// Subscribe to sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Handle for cancelling the sweep in progress.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The connectivity monitor consulted before pushing.
    #[must_use]
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Whether pushes may be attempted right now.
    #[must_use]
    pub fn is_online(&self) -> bool {
        if self.settings.require_initial_observation && !self.connectivity.has_observed() {
            return false;
        }
        self.connectivity.current().is_connected()
    }

    /// Records still awaiting acknowledgement across all collections.
    pub async fn pending_count(&self) -> usize {
        self.store.pending_count().await
    }

    /// Push a freshly stored record if the device is online.
    ///
    /// Returns the record as it now stands in the store. A failed push is
    /// logged and leaves the record pending.
    pub async fn push_new<T: Stored>(&self, record: T) -> T {
        if !self.settings.push_on_create || !self.is_online() {
            debug!(collection = %T::KIND, id = record.id(), "Record left pending");
            return record;
        }

        let _guard = self.sweep_lock.lock().await;
        match self.push_record(&record).await {
            Ok(synced) => synced,
            Err(_) => record,
        }
    }

    /// Push every pending record: projects first, then monitoring records,
    /// then credit entries, each in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] without doing any work when offline.
    /// Individual push failures are counted in the report, not returned.
    pub async fn manual_sync(&self) -> Result<SyncReport> {
        if !self.is_online() {
            return Err(Error::NoConnection);
        }

        let _guard = self.sweep_lock.lock().await;

        let pending = self.store.pending_count().await;
        info!(pending, "Starting sync sweep");
        let _ = self.event_tx.send(SyncEvent::SweepStarted { pending });

        let mut report = SyncReport::default();
        let completed = self.sweep::<Project>(&mut report).await
            && self.sweep::<MonitoringRecord>(&mut report).await
            && self.sweep::<CreditLedgerEntry>(&mut report).await;
        report.cancelled = !completed;
        self.cancel.reset();

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Sync sweep finished"
        );
        let _ = self.event_tx.send(SyncEvent::SweepFinished(report));
        Ok(report)
    }

    /// Returns `false` if the sweep was cancelled.
    async fn sweep<T: Stored>(&self, report: &mut SyncReport) -> bool {
        for record in self.store.pending::<T>().await {
            if self.cancel.is_cancelled() {
                info!(collection = %T::KIND, "Sync sweep cancelled");
                return false;
            }
            report.attempted += 1;
            if self.push_record(&record).await.is_ok() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        true
    }

    async fn push_record<T: Stored>(&self, record: &T) -> Result<T> {
        let id = record.id();
        let outcome = self.try_push(record).await;
        match &outcome {
            Ok(_) => {
                debug!(collection = %T::KIND, id, "Record synced");
                let _ = self.event_tx.send(SyncEvent::PushSucceeded {
                    collection: T::KIND,
                    id,
                });
            }
            Err(e) => {
                warn!(collection = %T::KIND, id, error = %e, "Push failed, record stays pending");
                let _ = self.event_tx.send(SyncEvent::PushFailed {
                    collection: T::KIND,
                    id,
                    reason: e.to_string(),
                });
            }
        }
        outcome
    }

    async fn try_push<T: Stored>(&self, record: &T) -> Result<T> {
        let envelope = PushEnvelope::for_record(record)?;

        match tokio::time::timeout(self.settings.push_timeout, self.remote.push(&envelope)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::Timeout {
                    operation: format!("push {} #{}", T::KIND, envelope.id),
                })
            }
        }

        // Only acknowledge the content that was actually sent.
        self.store
            .replace::<T, _>(envelope.id, |current| {
                if current.content_digest()? != envelope.digest {
                    return Err(Error::push_failure(
                        T::KIND.key(),
                        envelope.id,
                        "record changed while the push was in flight",
                    ));
                }
                let mut synced = current.clone();
                synced.mark_synced();
                Ok(synced)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityState;
    use crate::factory::{build_project, ProjectForm};
    use crate::remote::{RemoteBehavior, SimulatedRemote};
    use crate::storage::MemoryStorage;

    fn form(name: &str) -> ProjectForm {
        ProjectForm {
            name: name.to_string(),
            area: "10.0".to_string(),
            proponent: "Org".to_string(),
            ..ProjectForm::default()
        }
    }

    struct Fixture {
        store: Arc<RecordStore>,
        monitor: ConnectivityMonitor,
        remote: Arc<SimulatedRemote>,
        sync: Arc<SyncCoordinator>,
    }

    async fn fixture(settings: SyncSettings, latency: Duration) -> Fixture {
        let store = Arc::new(RecordStore::load(Arc::new(MemoryStorage::new())).await);
        let monitor = ConnectivityMonitor::default();
        let remote = Arc::new(SimulatedRemote::new(latency));
        let sync = Arc::new(SyncCoordinator::new(
            Arc::clone(&store),
            monitor.clone(),
            Arc::clone(&remote) as Arc<dyn RemoteAuthority>,
            settings,
        ));
        Fixture {
            store,
            monitor,
            remote,
            sync,
        }
    }

    async fn add_project(store: &RecordStore, name: &str) -> Project {
        store
            .append_with(|id| build_project(&form(name), id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_manual_sync_offline_does_nothing() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        add_project(&f.store, "A").await;
        f.monitor.report(ConnectivityState::Disconnected);

        let err = f.sync.manual_sync().await.unwrap_err();
        assert!(err.is_no_connection());
        assert!(f.remote.received().is_empty());
        assert_eq!(f.sync.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_manual_sync_pushes_all_pending() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        add_project(&f.store, "A").await;
        add_project(&f.store, "B").await;

        let report = f.sync.manual_sync().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                attempted: 2,
                succeeded: 2,
                failed: 0,
                cancelled: false
            }
        );
        assert_eq!(f.sync.pending_count().await, 0);
        assert!(f.store.get::<Project>(1).await.unwrap().synced);
    }

    #[tokio::test]
    async fn test_manual_sync_is_idempotent() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        add_project(&f.store, "A").await;

        f.sync.manual_sync().await.unwrap();
        let second = f.sync.manual_sync().await.unwrap();

        assert_eq!(second.attempted, 0);
        assert_eq!(f.remote.received().len(), 1);
        assert_eq!(f.store.len::<Project>().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_push_stays_pending() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        add_project(&f.store, "A").await;
        f.remote
            .set_behavior(RemoteBehavior::Reject("unavailable".to_string()));

        let report = f.sync.manual_sync().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(!f.store.get::<Project>(1).await.unwrap().synced);

        f.remote.set_behavior(RemoteBehavior::Accept);
        let report = f.sync.manual_sync().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(f.store.get::<Project>(1).await.unwrap().synced);
    }

    #[tokio::test]
    async fn test_hung_push_times_out() {
        let settings = SyncSettings {
            push_timeout: Duration::from_millis(20),
            ..SyncSettings::default()
        };
        let f = fixture(settings, Duration::ZERO).await;
        add_project(&f.store, "A").await;
        f.remote.set_behavior(RemoteBehavior::Hang);
        let mut events = f.sync.subscribe();

        let report = f.sync.manual_sync().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(f.sync.pending_count().await, 1);

        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::SweepStarted { pending: 1 }
        );
        match events.recv().await.unwrap() {
            SyncEvent::PushFailed { id, reason, .. } => {
                assert_eq!(id, 1);
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_new_when_online() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        let project = add_project(&f.store, "A").await;

        let pushed = f.sync.push_new(project).await;
        assert!(pushed.synced);
        assert!(f.store.get::<Project>(1).await.unwrap().synced);
    }

    #[tokio::test]
    async fn test_push_new_offline_leaves_pending() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        f.monitor.report(ConnectivityState::Disconnected);
        let project = add_project(&f.store, "A").await;

        let pushed = f.sync.push_new(project).await;
        assert!(!pushed.synced);
        assert!(f.remote.received().is_empty());
    }

    #[tokio::test]
    async fn test_push_new_disabled() {
        let settings = SyncSettings {
            push_on_create: false,
            ..SyncSettings::default()
        };
        let f = fixture(settings, Duration::ZERO).await;
        let project = add_project(&f.store, "A").await;

        assert!(!f.sync.push_new(project).await.synced);
        assert!(f.remote.received().is_empty());
    }

    #[tokio::test]
    async fn test_require_initial_observation() {
        let settings = SyncSettings {
            require_initial_observation: true,
            ..SyncSettings::default()
        };
        let f = fixture(settings, Duration::ZERO).await;
        assert!(!f.sync.is_online());
        assert!(f.sync.manual_sync().await.unwrap_err().is_no_connection());

        f.monitor.report(ConnectivityState::Connected);
        assert!(f.sync.is_online());
    }

    #[tokio::test]
    async fn test_optimistic_default_is_online() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        assert!(f.sync.is_online());
    }

    #[tokio::test]
    async fn test_content_changed_in_flight_stays_pending() {
        let f = fixture(SyncSettings::default(), Duration::from_millis(100)).await;
        let project = add_project(&f.store, "A").await;

        let sync = Arc::clone(&f.sync);
        let push = tokio::spawn(async move { sync.push_new(project).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        f.store
            .replace::<Project, _>(1, |p| {
                let mut p = p.clone();
                p.description = "edited".to_string();
                Ok(p)
            })
            .await
            .unwrap();

        let pushed = push.await.unwrap();
        assert!(!pushed.synced);
        assert!(!f.store.get::<Project>(1).await.unwrap().synced);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_records() {
        let f = fixture(SyncSettings::default(), Duration::from_millis(100)).await;
        for name in ["A", "B", "C"] {
            add_project(&f.store, name).await;
        }

        let sync = Arc::clone(&f.sync);
        let sweep = tokio::spawn(async move { sync.manual_sync().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.sync.cancel_handle().cancel();

        let report = sweep.await.unwrap().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.sync.pending_count().await, 2);
    }

    #[tokio::test]
    async fn test_cancel_while_queued_stops_the_sweep() {
        let f = fixture(SyncSettings::default(), Duration::from_millis(100)).await;
        let first = add_project(&f.store, "A").await;
        add_project(&f.store, "B").await;

        let sync = Arc::clone(&f.sync);
        let create_push = tokio::spawn(async move { sync.push_new(first).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sync = Arc::clone(&f.sync);
        let sweep = tokio::spawn(async move { sync.manual_sync().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.sync.cancel_handle().cancel();

        assert!(create_push.await.unwrap().synced);
        let report = sweep.await.unwrap().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attempted, 0);
        assert_eq!(f.sync.pending_count().await, 1);
        assert!(!f.sync.cancel_handle().is_cancelled());

        let report = f.sync.manual_sync().await.unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_sweep_order_projects_first() {
        let f = fixture(SyncSettings::default(), Duration::ZERO).await;
        add_project(&f.store, "A").await;
        f.store
            .append_with(|id| {
                Ok(CreditLedgerEntry {
                    id,
                    project_id: 1,
                    quantity: 1.0,
                    unit_price: 0.0,
                    operation: crate::model::CreditOperation::Trade,
                    timestamp: chrono::Utc::now(),
                    synced: false,
                })
            })
            .await
            .unwrap();

        f.sync.manual_sync().await.unwrap();
        let order: Vec<CollectionKind> =
            f.remote.received().iter().map(|e| e.collection).collect();
        assert_eq!(order, [CollectionKind::Projects, CollectionKind::Credits]);
    }

    #[test]
    fn test_report_display() {
        let report = SyncReport {
            attempted: 3,
            succeeded: 2,
            failed: 1,
            cancelled: true,
        };
        assert_eq!(report.to_string(), "3 attempted, 2 synced, 1 failed (cancelled)");
    }
}
