//! End-to-end behavior over an on-disk database: capture offline, restart,
//! sync once the network returns.

use std::sync::Arc;
use std::time::Duration;

use bluecarbon::config::Config;
use bluecarbon::connectivity::{ConnectivityMonitor, ConnectivityState};
use bluecarbon::factory::{CreditForm, MonitoringForm, ProjectForm};
use bluecarbon::model::ProjectStatus;
use bluecarbon::remote::{RemoteAuthority, RemoteBehavior, SimulatedRemote};
use bluecarbon::FieldService;

fn config_in(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.storage.database_path = Some(dir.path().join("field").join("records.db"));
    config.sync.push_timeout_secs = 1;
    config
}

fn mangrove_test() -> ProjectForm {
    ProjectForm {
        name: "Mangrove Test".to_string(),
        area: "10.0".to_string(),
        proponent: "Org".to_string(),
        ..ProjectForm::default()
    }
}

async fn open(
    config: &Config,
    state: ConnectivityState,
) -> (FieldService, ConnectivityMonitor, Arc<SimulatedRemote>) {
    let monitor = ConnectivityMonitor::default();
    monitor.report(state);
    let remote = Arc::new(SimulatedRemote::new(Duration::ZERO));
    let service = FieldService::open(
        config,
        monitor.clone(),
        Arc::clone(&remote) as Arc<dyn RemoteAuthority>,
    )
    .await
    .unwrap();
    (service, monitor, remote)
}

#[tokio::test]
async fn offline_capture_survives_restart_and_syncs_later() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    {
        let (service, _monitor, remote) = open(&config, ConnectivityState::Disconnected).await;

        let project = service.submit_project(&mangrove_test()).await.unwrap();
        assert_eq!(project.id, 1);
        assert!(!project.synced);

        let record = service
            .submit_monitoring_record(&MonitoringForm {
                project_id: "1".to_string(),
                ndvi_value: "0.65".to_string(),
                ..MonitoringForm::default()
            })
            .await
            .unwrap();
        assert_eq!(record.measurements.soil_carbon, None);

        let err = service.manual_sync().await.unwrap_err();
        assert!(err.is_no_connection());
        assert!(remote.received().is_empty());
    }

    let (service, monitor, remote) = open(&config, ConnectivityState::Disconnected).await;
    let summary = service.dashboard_summary().await;
    assert_eq!(summary.total_projects, 1);
    assert_eq!(summary.total_monitoring_records, 1);
    assert_eq!(summary.pending_sync, 2);

    let restored = service.monitoring_records(None).await;
    assert_eq!(restored[0].measurements.ndvi, Some(0.65));
    assert_eq!(restored[0].measurements.soil_carbon, None);

    monitor.report(ConnectivityState::Connected);
    let report = service.manual_sync().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(remote.accepted_count(), 2);

    let summary = service.dashboard_summary().await;
    assert_eq!(summary.total_projects, 1);
    assert_eq!(summary.pending_sync, 0);
}

#[tokio::test]
async fn synced_flags_persist_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    {
        let (service, _monitor, _remote) = open(&config, ConnectivityState::Connected).await;
        let project = service.submit_project(&mangrove_test()).await.unwrap();
        assert!(project.synced);
    }

    let (service, _monitor, remote) = open(&config, ConnectivityState::Connected).await;
    assert!(service.projects().await[0].synced);

    let report = service.manual_sync().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert!(remote.received().is_empty());
}

#[tokio::test]
async fn failed_pushes_are_retried_by_the_next_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let (service, _monitor, remote) = open(&config, ConnectivityState::Connected).await;

    remote.set_behavior(RemoteBehavior::Hang);
    let project = service.submit_project(&mangrove_test()).await.unwrap();
    assert!(!project.synced);

    remote.set_behavior(RemoteBehavior::Accept);
    let report = service.manual_sync().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(service.projects().await[0].synced);

    // Both attempts carried the same idempotency key.
    let received = remote.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].digest, received[1].digest);
}

#[tokio::test]
async fn credit_lifecycle_updates_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let (service, _monitor, _remote) = open(&config, ConnectivityState::Disconnected).await;

    service.submit_project(&mangrove_test()).await.unwrap();
    service
        .set_project_status(1, ProjectStatus::Active)
        .await
        .unwrap();
    service.record_sequestration(1, 250.0).await.unwrap();

    for (operation, quantity) in [("issue", "100"), ("retire", "25"), ("trade", "50")] {
        service
            .submit_credit_entry(&CreditForm {
                project_id: "1".to_string(),
                quantity: quantity.to_string(),
                unit_price: "18".to_string(),
                operation: operation.to_string(),
            })
            .await
            .unwrap();
    }

    let summary = service.dashboard_summary().await;
    assert!((summary.total_carbon_sequestered - 250.0).abs() < f64::EPSILON);
    assert!((summary.total_credits_issued - 100.0).abs() < f64::EPSILON);
    assert_eq!(summary.total_ledger_entries, 3);
    assert_eq!(summary.pending_sync, 4);

    let ids: Vec<u64> = service.credit_entries().await.iter().map(|e| e.id).collect();
    assert_eq!(ids, [1, 2, 3]);
}
