//! CLI command definitions.
//!
//! Form fields are taken as raw text and handed to the record factory, so
//! the CLI enforces exactly the same rules as any other front end.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::factory::{CreditForm, MonitoringForm, ProjectForm};
use crate::model::ProjectStatus;

/// Project commands.
#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Register a new project
    Add(ProjectAddArgs),

    /// List registered projects
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Move a project to a new lifecycle status
    Status {
        /// Project identifier
        id: u64,
        /// New status
        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Add verified sequestration to an active project
    Sequester {
        /// Project identifier
        id: u64,
        /// Tonnes CO2e
        tonnes: f64,
    },
}

/// Project registration arguments.
#[derive(Debug, Default, Args)]
pub struct ProjectAddArgs {
    /// Project name
    #[arg(long)]
    pub name: Option<String>,

    /// Area in hectares
    #[arg(long)]
    pub area: Option<String>,

    /// Proponent organization
    #[arg(long)]
    pub proponent: Option<String>,

    /// Ecosystem (mangrove, seagrass, saltmarsh, wetland)
    #[arg(long)]
    pub ecosystem: Option<String>,

    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<String>,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<String>,

    /// Methodology code, e.g. VM0033
    #[arg(long)]
    pub methodology: Option<String>,

    /// Crediting period in years
    #[arg(long)]
    pub duration: Option<String>,

    /// Expected sequestration, tonnes CO2e per year
    #[arg(long)]
    pub sequestration: Option<String>,

    /// Free-text description
    #[arg(long)]
    pub description: Option<String>,
}

impl From<ProjectAddArgs> for ProjectForm {
    fn from(args: ProjectAddArgs) -> Self {
        Self {
            name: args.name.unwrap_or_default(),
            ecosystem: args.ecosystem.unwrap_or_default(),
            latitude: args.lat.unwrap_or_default(),
            longitude: args.lon.unwrap_or_default(),
            area: args.area.unwrap_or_default(),
            proponent: args.proponent.unwrap_or_default(),
            methodology: args.methodology.unwrap_or_default(),
            duration: args.duration.unwrap_or_default(),
            expected_sequestration: args.sequestration.unwrap_or_default(),
            description: args.description.unwrap_or_default(),
        }
    }
}

/// Monitoring (MRV) commands.
#[derive(Debug, Subcommand)]
pub enum MrvCommand {
    /// Capture a field observation
    Add(MrvAddArgs),

    /// List monitoring records
    List {
        /// Only records for this project
        #[arg(short, long)]
        project: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Field observation arguments. Omitted measurements are recorded as absent.
#[derive(Debug, Default, Args)]
pub struct MrvAddArgs {
    /// Project identifier
    #[arg(short, long)]
    pub project: Option<String>,

    /// Observation date (YYYY-MM-DD), today if omitted
    #[arg(long)]
    pub date: Option<String>,

    /// Soil carbon density
    #[arg(long)]
    pub soil_carbon: Option<String>,

    /// Vegetation index
    #[arg(long, allow_hyphen_values = true)]
    pub ndvi: Option<String>,

    /// Canopy height
    #[arg(long)]
    pub canopy_height: Option<String>,

    /// Stem diameter
    #[arg(long)]
    pub stem_diameter: Option<String>,

    /// Tree height
    #[arg(long)]
    pub tree_height: Option<String>,

    /// Survival rate percentage
    #[arg(long)]
    pub survival_rate: Option<String>,

    /// Dominant species
    #[arg(long)]
    pub species: Option<String>,

    /// Attached media reference (repeatable)
    #[arg(long = "media")]
    pub media: Vec<String>,
}

impl From<MrvAddArgs> for MonitoringForm {
    fn from(args: MrvAddArgs) -> Self {
        Self {
            project_id: args.project.unwrap_or_default(),
            observation_date: args.date.unwrap_or_default(),
            soil_carbon: args.soil_carbon.unwrap_or_default(),
            ndvi_value: args.ndvi.unwrap_or_default(),
            canopy_height: args.canopy_height.unwrap_or_default(),
            stem_diameter: args.stem_diameter.unwrap_or_default(),
            tree_height: args.tree_height.unwrap_or_default(),
            survival_rate: args.survival_rate.unwrap_or_default(),
            species: args.species.unwrap_or_default(),
            media: args.media,
        }
    }
}

/// Credit ledger commands.
#[derive(Debug, Subcommand)]
pub enum CreditsCommand {
    /// Record a credit movement
    Add(CreditAddArgs),

    /// Show the credit ledger
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Credit movement arguments.
#[derive(Debug, Default, Args)]
pub struct CreditAddArgs {
    /// Operation (issue, retire, trade)
    pub operation: String,

    /// Project identifier
    #[arg(short, long)]
    pub project: Option<String>,

    /// Number of credits
    #[arg(long)]
    pub quantity: Option<String>,

    /// Unit price
    #[arg(long)]
    pub price: Option<String>,
}

impl From<CreditAddArgs> for CreditForm {
    fn from(args: CreditAddArgs) -> Self {
        Self {
            project_id: args.project.unwrap_or_default(),
            quantity: args.quantity.unwrap_or_default(),
            unit_price: args.price.unwrap_or_default(),
            operation: args.operation,
        }
    }
}

/// Sync command arguments.
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Push pending records each time the network comes back
    #[arg(long)]
    pub sync_on_reconnect: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Project status argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Approved and running
    Active,
    /// Crediting period finished
    Completed,
    /// Registration refused
    Rejected,
}

impl From<StatusArg> for ProjectStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Self::Active,
            StatusArg::Completed => Self::Completed,
            StatusArg::Rejected => Self::Rejected,
        }
    }
}

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_arg_conversion() {
        assert_eq!(ProjectStatus::from(StatusArg::Active), ProjectStatus::Active);
        assert_eq!(
            ProjectStatus::from(StatusArg::Completed),
            ProjectStatus::Completed
        );
        assert_eq!(
            ProjectStatus::from(StatusArg::Rejected),
            ProjectStatus::Rejected
        );
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_project_args_to_form() {
        let args = ProjectAddArgs {
            name: Some("Mangrove Test".to_string()),
            area: Some("10.0".to_string()),
            proponent: Some("Org".to_string()),
            ..ProjectAddArgs::default()
        };
        let form = ProjectForm::from(args);
        assert_eq!(form.name, "Mangrove Test");
        assert_eq!(form.area, "10.0");
        assert!(form.methodology.is_empty());
    }

    #[test]
    fn test_mrv_args_omitted_fields_are_blank() {
        let args = MrvAddArgs {
            project: Some("1".to_string()),
            ndvi: Some("0.65".to_string()),
            media: vec!["plot-a.jpg".to_string()],
            ..MrvAddArgs::default()
        };
        let form = MonitoringForm::from(args);
        assert!(form.soil_carbon.is_empty());
        assert_eq!(form.ndvi_value, "0.65");
        assert_eq!(form.media, ["plot-a.jpg"]);
    }

    #[test]
    fn test_credit_args_to_form() {
        let args = CreditAddArgs {
            operation: "retire".to_string(),
            project: Some("2".to_string()),
            quantity: Some("5".to_string()),
            price: None,
        };
        let form = CreditForm::from(args);
        assert_eq!(form.operation, "retire");
        assert_eq!(form.project_id, "2");
        assert!(form.unit_price.is_empty());
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }

    #[test]
    fn test_watch_command_debug() {
        let cmd = WatchCommand {
            sync_on_reconnect: true,
        };
        assert!(format!("{cmd:?}").contains("sync_on_reconnect: true"));
    }

    #[test]
    fn test_sync_command_debug() {
        let cmd = SyncCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }
}
