//! Command-line interface for bluecarbon.
//!
//! This module provides the CLI structure for the `bcfield` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, CreditAddArgs, CreditsCommand, MrvAddArgs, MrvCommand, OutputFormat,
    ProjectAddArgs, ProjectCommand, StatusArg, StatusCommand, SyncCommand, WatchCommand,
};

use crate::connectivity::ConnectivityState;
use crate::logging::Verbosity;

/// bcfield - Field records for blue-carbon projects
///
/// Registers projects, captures monitoring data and credit movements on the
/// device, and pushes them to the registry when a connection is available.
#[derive(Debug, Parser)]
#[command(name = "bcfield")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Skip the reachability probe and work offline
    #[arg(long, global = true, conflicts_with = "assume_online")]
    pub offline: bool,

    /// Skip the reachability probe and assume the network is up
    #[arg(long, global = true)]
    pub assume_online: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register and manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Capture and list monitoring records
    #[command(subcommand)]
    Mrv(MrvCommand),

    /// Record and list credit movements
    #[command(subcommand)]
    Credits(CreditsCommand),

    /// Push every pending record now
    Sync(SyncCommand),

    /// Show dashboard totals and storage status
    Status(StatusCommand),

    /// Probe the network periodically and report transitions
    Watch(WatchCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }

    /// Connectivity forced by flags, if any. `None` means probe.
    #[must_use]
    pub fn forced_connectivity(&self) -> Option<ConnectivityState> {
        if self.offline {
            Some(ConnectivityState::Disconnected)
        } else if self.assume_online {
            Some(ConnectivityState::Connected)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "bcfield");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["bcfield", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(
            parse(&["bcfield", "-vv", "status"]).verbosity(),
            Verbosity::Debug
        );
        assert_eq!(
            parse(&["bcfield", "-q", "status"]).verbosity(),
            Verbosity::Quiet
        );
    }

    #[test]
    fn test_parse_project_add() {
        let cli = parse(&[
            "bcfield",
            "project",
            "add",
            "--name",
            "Mangrove Test",
            "--area",
            "10.0",
            "--proponent",
            "Org",
            "--lat",
            "-8.7",
        ]);
        match cli.command {
            Command::Project(ProjectCommand::Add(args)) => {
                assert_eq!(args.name.as_deref(), Some("Mangrove Test"));
                assert_eq!(args.lat.as_deref(), Some("-8.7"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_project_status() {
        let cli = parse(&["bcfield", "project", "status", "3", "active"]);
        assert!(matches!(
            cli.command,
            Command::Project(ProjectCommand::Status {
                id: 3,
                status: StatusArg::Active
            })
        ));
    }

    #[test]
    fn test_parse_mrv_add_with_media() {
        let cli = parse(&[
            "bcfield", "mrv", "add", "-p", "1", "--ndvi", "0.65", "--media", "a.jpg", "--media",
            "b.jpg",
        ]);
        match cli.command {
            Command::Mrv(MrvCommand::Add(args)) => {
                assert_eq!(args.project.as_deref(), Some("1"));
                assert!(args.soil_carbon.is_none());
                assert_eq!(args.media, ["a.jpg", "b.jpg"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_credits_add() {
        let cli = parse(&[
            "bcfield",
            "credits",
            "add",
            "issue",
            "--project",
            "1",
            "--quantity",
            "40",
        ]);
        assert!(matches!(cli.command, Command::Credits(CreditsCommand::Add(_))));
    }

    #[test]
    fn test_parse_list_json() {
        let cli = parse(&["bcfield", "mrv", "list", "--project", "2", "-f", "json"]);
        assert!(matches!(
            cli.command,
            Command::Mrv(MrvCommand::List {
                project: Some(2),
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn test_parse_watch() {
        let cli = parse(&["bcfield", "watch", "--sync-on-reconnect"]);
        assert!(matches!(
            cli.command,
            Command::Watch(WatchCommand {
                sync_on_reconnect: true
            })
        ));
        let cli = parse(&["bcfield", "watch"]);
        assert!(matches!(
            cli.command,
            Command::Watch(WatchCommand {
                sync_on_reconnect: false
            })
        ));
    }

    #[test]
    fn test_forced_connectivity() {
        assert_eq!(parse(&["bcfield", "sync"]).forced_connectivity(), None);
        assert_eq!(
            parse(&["bcfield", "--offline", "sync"]).forced_connectivity(),
            Some(ConnectivityState::Disconnected)
        );
        assert_eq!(
            parse(&["bcfield", "sync", "--assume-online"]).forced_connectivity(),
            Some(ConnectivityState::Connected)
        );
    }

    #[test]
    fn test_offline_conflicts_with_assume_online() {
        let result = Cli::try_parse_from(["bcfield", "--offline", "--assume-online", "sync"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["bcfield", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
