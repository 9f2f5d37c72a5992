//! `bcfield` - CLI for bluecarbon
//!
//! Registers projects, captures monitoring records and credit movements into
//! the local store, and pushes pending records to the remote authority.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use bluecarbon::cli::{
    Cli, Command, ConfigCommand, CreditsCommand, MrvCommand, OutputFormat, ProjectCommand,
    WatchCommand,
};
use bluecarbon::connectivity::{spawn_probe, ConnectivityMonitor, ReachabilityProbe, TcpProbe};
use bluecarbon::model::{CreditLedgerEntry, MonitoringRecord, Project};
use bluecarbon::remote::{RemoteAuthority, SimulatedRemote};
use bluecarbon::storage::{DurableStorage, SqliteStorage};
use bluecarbon::{init_logging, Config, FieldService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    let forced = cli.forced_connectivity();

    let command = match cli.command {
        Command::Config(cmd) => return handle_config(&config, cmd),
        other => other,
    };

    let connectivity = ConnectivityMonitor::default();
    let state = match forced {
        Some(state) => state,
        None => {
            TcpProbe::new(config.probe_address(), config.probe_timeout())
                .check()
                .await
        }
    };
    connectivity.report(state);

    let storage = Arc::new(
        SqliteStorage::open(config.database_path())
            .with_context(|| format!("opening {}", config.database_path().display()))?,
    );
    let remote: Arc<dyn RemoteAuthority> =
        Arc::new(SimulatedRemote::new(config.simulated_latency()));
    let service = FieldService::with_storage(
        Arc::clone(&storage) as Arc<dyn DurableStorage>,
        connectivity,
        remote,
        config.sync_settings(),
    )
    .await;

    match command {
        Command::Project(cmd) => handle_project(&service, cmd).await,
        Command::Mrv(cmd) => handle_mrv(&service, cmd).await,
        Command::Credits(cmd) => handle_credits(&service, cmd).await,
        Command::Sync(cmd) => {
            let report = service.manual_sync().await?;
            if cmd.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "attempted": report.attempted,
                        "succeeded": report.succeeded,
                        "failed": report.failed,
                        "cancelled": report.cancelled,
                    }))?
                );
            } else {
                println!("Sync complete: {report}");
            }
            Ok(())
        }
        Command::Status(cmd) => handle_status(&config, &service, &storage, cmd.json).await,
        Command::Watch(cmd) => handle_watch(&config, &service, cmd).await,
        Command::Config(_) => Ok(()),
    }
}

async fn handle_project(service: &FieldService, cmd: ProjectCommand) -> anyhow::Result<()> {
    match cmd {
        ProjectCommand::Add(args) => {
            let project = service.submit_project(&args.into()).await?;
            println!(
                "Registered project #{} \"{}\" ({})",
                project.id,
                project.name,
                sync_label(project.synced)
            );
        }
        ProjectCommand::List { format } => {
            let projects = service.projects().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&projects)?),
                OutputFormat::Table => print_projects(&projects),
            }
        }
        ProjectCommand::Status { id, status } => {
            let project = service.set_project_status(id, status.into()).await?;
            println!("Project #{} is now {}", project.id, project.status);
        }
        ProjectCommand::Sequester { id, tonnes } => {
            let project = service.record_sequestration(id, tonnes).await?;
            println!(
                "Project #{} has sequestered {:.3} tCO2e",
                project.id, project.carbon_sequestered
            );
        }
    }
    Ok(())
}

async fn handle_mrv(service: &FieldService, cmd: MrvCommand) -> anyhow::Result<()> {
    match cmd {
        MrvCommand::Add(args) => {
            let record = service.submit_monitoring_record(&args.into()).await?;
            println!(
                "Captured monitoring record #{} for project #{} ({})",
                record.id,
                record.project_id,
                sync_label(record.synced)
            );
        }
        MrvCommand::List { project, format } => {
            let records = service.monitoring_records(project).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Table => print_monitoring(&records),
            }
        }
    }
    Ok(())
}

async fn handle_credits(service: &FieldService, cmd: CreditsCommand) -> anyhow::Result<()> {
    match cmd {
        CreditsCommand::Add(args) => {
            let entry = service.submit_credit_entry(&args.into()).await?;
            println!(
                "Recorded {} of {:.3} credits for project #{} ({})",
                entry.operation,
                entry.quantity,
                entry.project_id,
                sync_label(entry.synced)
            );
        }
        CreditsCommand::List { format } => {
            let entries = service.credit_entries().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Table => print_credits(&entries),
            }
        }
    }
    Ok(())
}

async fn handle_status(
    config: &Config,
    service: &FieldService,
    storage: &SqliteStorage,
    json: bool,
) -> anyhow::Result<()> {
    let summary = service.dashboard_summary().await;
    let online = service.sync().is_online();
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "online": online,
            "database_path": config.database_path(),
            "db_size_bytes": stats.db_size_bytes,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("bcfield status");
        println!("--------------");
        println!("Network:             {}", if online { "online" } else { "offline" });
        println!("Database:            {}", config.database_path().display());
        println!("Database size:       {} bytes", stats.db_size_bytes);
        for collection in &stats.collections {
            println!(
                "  {:<18} {} records, updated {}",
                collection.key, collection.record_count, collection.updated_at
            );
        }
        println!();
        println!("Projects:            {}", summary.total_projects);
        println!("Monitoring records:  {}", summary.total_monitoring_records);
        println!("Ledger entries:      {}", summary.total_ledger_entries);
        println!(
            "Carbon sequestered:  {:.3} tCO2e",
            summary.total_carbon_sequestered
        );
        println!("Credits issued:      {:.3}", summary.total_credits_issued);
        println!("Pending sync:        {}", summary.pending_sync);
    }
    Ok(())
}

async fn handle_watch(
    config: &Config,
    service: &FieldService,
    cmd: WatchCommand,
) -> anyhow::Result<()> {
    let monitor = service.sync().connectivity().clone();
    let mut transitions = monitor.subscribe_channel();
    let probe: Arc<dyn ReachabilityProbe> =
        Arc::new(TcpProbe::new(config.probe_address(), config.probe_timeout()));
    let (probe_handle, probe_task) = spawn_probe(monitor.clone(), probe, config.probe_interval());

    println!(
        "Probing {} every {}s. Press Ctrl+C to stop.",
        config.probe_address(),
        config.remote.probe_interval_secs
    );
    println!(
        "Network is {}, {} record(s) pending",
        monitor.current(),
        service.sync().pending_count().await
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopping...");
                break;
            }
            Some(state) = transitions.recv() => {
                println!("Network is now {state}");
                if state.is_connected() && cmd.sync_on_reconnect {
                    match service.manual_sync().await {
                        Ok(report) => println!("Sync complete: {report}"),
                        Err(e) => println!("Sync skipped: {e}"),
                    }
                }
            }
        }
    }

    probe_handle.stop();
    probe_task.abort();
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:       {}", config.database_path().display());
                println!();
                println!("[Sync]");
                println!("  Push timeout (s):    {}", config.sync.push_timeout_secs);
                println!("  Push on create:      {}", config.sync.push_on_create);
                println!(
                    "  Require observation: {}",
                    config.sync.require_initial_observation
                );
                println!();
                println!("[Remote]");
                println!("  Simulated latency:   {} ms", config.remote.simulated_latency_ms);
                println!("  Probe address:       {}", config.probe_address());
                println!("  Probe interval (s):  {}", config.remote.probe_interval_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn sync_label(synced: bool) -> &'static str {
    if synced {
        "synced"
    } else {
        "pending sync"
    }
}

fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects registered.");
        return;
    }
    println!(
        "{:>4}  {:<24} {:<10} {:<10} {:>10} {:>12} {:>10}  SYNC",
        "ID", "NAME", "ECOSYSTEM", "STATUS", "AREA (ha)", "SEQ (tCO2e)", "CREDITS"
    );
    for p in projects {
        println!(
            "{:>4}  {:<24} {:<10} {:<10} {:>10.2} {:>12.3} {:>10.3}  {}",
            p.id,
            truncate(&p.name, 24),
            p.ecosystem.to_string(),
            p.status.to_string(),
            p.area_hectares,
            p.carbon_sequestered,
            p.credits_issued,
            sync_label(p.synced)
        );
    }
}

fn print_monitoring(records: &[MonitoringRecord]) {
    if records.is_empty() {
        println!("No monitoring records.");
        return;
    }
    println!(
        "{:>4}  {:>7}  {:<10}  {:>8}  {:>6}  {:>8}  {:<22}  SYNC",
        "ID", "PROJECT", "DATE", "SOIL C", "NDVI", "SURVIVAL", "SPECIES"
    );
    for r in records {
        let m = &r.measurements;
        println!(
            "{:>4}  {:>7}  {:<10}  {:>8}  {:>6}  {:>8}  {:<22}  {}",
            r.id,
            r.project_id,
            r.observation_date,
            optional(m.soil_carbon),
            optional(m.ndvi),
            optional(m.survival_rate),
            m.species.map_or_else(|| "-".to_string(), |s| s.to_string()),
            sync_label(r.synced)
        );
    }
}

fn print_credits(entries: &[CreditLedgerEntry]) {
    if entries.is_empty() {
        println!("The credit ledger is empty.");
        return;
    }
    println!(
        "{:>4}  {:>7}  {:<7}  {:>10}  {:>10}  {:>12}  SYNC",
        "ID", "PROJECT", "OP", "QUANTITY", "PRICE", "VALUE"
    );
    for e in entries {
        println!(
            "{:>4}  {:>7}  {:<7}  {:>10.3}  {:>10.2}  {:>12.2}  {}",
            e.id,
            e.project_id,
            e.operation.to_string(),
            e.quantity,
            e.unit_price,
            e.total_value(),
            sync_label(e.synced)
        );
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
