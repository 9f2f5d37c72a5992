//! Entry points for the presentation layer.
//!
//! [`FieldService`] is the only surface a UI or CLI needs: it runs forms
//! through the factory, stores the result, hands new records to the sync
//! coordinator, and answers dashboard queries.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::factory::{
    build_credit_entry, build_monitoring_record, build_project, CreditForm, MonitoringForm,
    ProjectForm,
};
use crate::model::{CreditLedgerEntry, CreditOperation, MonitoringRecord, Project, ProjectStatus};
use crate::remote::RemoteAuthority;
use crate::storage::{DurableStorage, SqliteStorage};
use crate::store::RecordStore;
use crate::sync::{SyncCoordinator, SyncReport, SyncSettings};

/// Aggregate figures for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// Registered projects.
    pub total_projects: usize,
    /// Sum of credits issued over all projects.
    pub total_credits_issued: f64,
    /// Sum of carbon sequestered over all projects, tonnes CO2e.
    pub total_carbon_sequestered: f64,
    /// Monitoring records captured.
    pub total_monitoring_records: usize,
    /// Credit ledger entries.
    pub total_ledger_entries: usize,
    /// Records awaiting acknowledgement.
    pub pending_sync: usize,
}

/// Facade over the record store and the sync coordinator.
#[derive(Debug)]
pub struct FieldService {
    store: Arc<RecordStore>,
    sync: Arc<SyncCoordinator>,
}

impl FieldService {
    /// Open the service on the configured SQLite database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(
        config: &Config,
        connectivity: ConnectivityMonitor,
        remote: Arc<dyn RemoteAuthority>,
    ) -> Result<Self> {
        let storage = SqliteStorage::open(config.database_path())?;
        Ok(Self::with_storage(
            Arc::new(storage),
            connectivity,
            remote,
            config.sync_settings(),
        )
        .await)
    }

    /// Build the service over an arbitrary storage backend.
    pub async fn with_storage(
        storage: Arc<dyn DurableStorage>,
        connectivity: ConnectivityMonitor,
        remote: Arc<dyn RemoteAuthority>,
        settings: SyncSettings,
    ) -> Self {
        let store = Arc::new(RecordStore::load(storage).await);
        let sync = Arc::new(SyncCoordinator::new(
            Arc::clone(&store),
            connectivity,
            remote,
            settings,
        ));
        Self { store, sync }
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// The sync coordinator.
    #[must_use]
    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    /// Register a project.
    ///
    /// The project is stored before any push is attempted; the returned copy
    /// reflects whether the immediate push succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a bad form or [`Error::Persistence`]
    /// if the write fails. Push failures are not errors.
    pub async fn submit_project(&self, form: &ProjectForm) -> Result<Project> {
        let project = self
            .store
            .append_with(|id| build_project(form, id))
            .await?;
        info!(id = project.id, name = %project.name, "Project registered");
        Ok(self.sync.push_new(project).await)
    }

    /// Record a field observation against an existing project.
    ///
    /// # Errors
    ///
    /// Same as [`FieldService::submit_project`].
    pub async fn submit_monitoring_record(&self, form: &MonitoringForm) -> Result<MonitoringRecord> {
        let projects = self.store.get_all::<Project>().await;
        let record = self
            .store
            .append_with(|id| build_monitoring_record(form, &projects, id))
            .await?;
        info!(id = record.id, project = record.project_id, "Monitoring record captured");
        Ok(self.sync.push_new(record).await)
    }

    /// Add a credit movement to the ledger.
    ///
    /// An `issue` also raises the project's `credits_issued`. The project is
    /// updated first and restored if the ledger write fails.
    ///
    /// # Errors
    ///
    /// Same as [`FieldService::submit_project`].
    pub async fn submit_credit_entry(&self, form: &CreditForm) -> Result<CreditLedgerEntry> {
        let projects = self.store.get_all::<Project>().await;
        let ledger = self.store.get_all::<CreditLedgerEntry>().await;
        let draft = build_credit_entry(form, &projects, &ledger, 0)?;

        if draft.operation == CreditOperation::Issue {
            self.adjust_credits_issued(draft.project_id, draft.quantity)
                .await?;
        }

        let entry = match self.store.append(draft.clone()).await {
            Ok(entry) => entry,
            Err(e) => {
                if draft.operation == CreditOperation::Issue {
                    if let Err(undo) = self
                        .adjust_credits_issued(draft.project_id, -draft.quantity)
                        .await
                    {
                        error!(
                            project = draft.project_id,
                            error = %undo,
                            "Could not restore credits issued after failed ledger write"
                        );
                    }
                }
                return Err(e);
            }
        };

        info!(
            id = entry.id,
            project = entry.project_id,
            operation = %entry.operation,
            quantity = entry.quantity,
            "Credit entry recorded"
        );
        Ok(self.sync.push_new(entry).await)
    }

    /// Add verified sequestration to an active project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `tonnes` is not positive or the
    /// project is not active, [`Error::NotFound`] for an unknown project.
    pub async fn record_sequestration(&self, project_id: u64, tonnes: f64) -> Result<Project> {
        if !tonnes.is_finite() || tonnes <= 0.0 {
            return Err(Error::validation("tonnes", "must be greater than zero"));
        }

        let project = self
            .store
            .replace::<Project, _>(project_id, |current| {
                if current.status != ProjectStatus::Active {
                    return Err(Error::validation(
                        "projectId",
                        format!(
                            "sequestration needs an active project, this one is {}",
                            current.status
                        ),
                    ));
                }
                let mut updated = current.clone();
                updated.carbon_sequestered += tonnes;
                Ok(updated)
            })
            .await?;

        info!(
            id = project.id,
            tonnes,
            total = project.carbon_sequestered,
            "Sequestration recorded"
        );
        Ok(project)
    }

    /// Move a project through its lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a transition the lifecycle does not
    /// allow, [`Error::NotFound`] for an unknown project.
    pub async fn set_project_status(
        &self,
        project_id: u64,
        status: ProjectStatus,
    ) -> Result<Project> {
        let project = self
            .store
            .replace::<Project, _>(project_id, |current| {
                if !current.status.can_transition_to(status) {
                    return Err(Error::validation(
                        "status",
                        format!("cannot move from {} to {status}", current.status),
                    ));
                }
                let mut updated = current.clone();
                updated.status = status;
                Ok(updated)
            })
            .await?;

        info!(id = project.id, status = %project.status, "Project status changed");
        Ok(project)
    }

    /// Push every pending record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] when offline.
    pub async fn manual_sync(&self) -> Result<SyncReport> {
        self.sync.manual_sync().await
    }

    /// Aggregate figures over the current store contents.
    pub async fn dashboard_summary(&self) -> DashboardSummary {
        let projects = self.store.get_all::<Project>().await;

        DashboardSummary {
            total_projects: projects.len(),
            total_credits_issued: projects.iter().map(|p| p.credits_issued).sum(),
            total_carbon_sequestered: projects.iter().map(|p| p.carbon_sequestered).sum(),
            total_monitoring_records: self.store.len::<MonitoringRecord>().await,
            total_ledger_entries: self.store.len::<CreditLedgerEntry>().await,
            pending_sync: self.store.pending_count().await,
        }
    }

    /// All projects in registration order.
    pub async fn projects(&self) -> Vec<Project> {
        self.store.get_all().await
    }

    /// Monitoring records, optionally restricted to one project.
    pub async fn monitoring_records(&self, project_id: Option<u64>) -> Vec<MonitoringRecord> {
        let mut records: Vec<MonitoringRecord> = self.store.get_all().await;
        if let Some(project_id) = project_id {
            records.retain(|r| r.project_id == project_id);
        }
        records
    }

    /// The credit ledger in entry order.
    pub async fn credit_entries(&self) -> Vec<CreditLedgerEntry> {
        self.store.get_all().await
    }

    async fn adjust_credits_issued(&self, project_id: u64, delta: f64) -> Result<Project> {
        self.store
            .replace::<Project, _>(project_id, |current| {
                let mut updated = current.clone();
                updated.credits_issued += delta;
                if updated.credits_issued > updated.carbon_sequestered {
                    return Err(Error::validation(
                        "quantity",
                        "credits issued would exceed carbon sequestered",
                    ));
                }
                Ok(updated)
            })
            .await
    }
}
