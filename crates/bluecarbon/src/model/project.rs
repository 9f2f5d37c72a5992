//! Registered blue-carbon projects.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{CollectionKind, Record};

/// Pattern accepted for methodology codes outside the known set.
const METHODOLOGY_CODE_PATTERN: &str = r"^[A-Z][A-Z0-9-]{2,31}$";

/// Coastal ecosystem a project restores or protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcosystemType {
    /// Mangrove forest.
    #[default]
    Mangrove,
    /// Seagrass meadow.
    Seagrass,
    /// Tidal salt marsh.
    Saltmarsh,
    /// Other coastal wetland.
    Wetland,
}

impl std::fmt::Display for EcosystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mangrove => write!(f, "mangrove"),
            Self::Seagrass => write!(f, "seagrass"),
            Self::Saltmarsh => write!(f, "saltmarsh"),
            Self::Wetland => write!(f, "wetland"),
        }
    }
}

impl FromStr for EcosystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mangrove" => Ok(Self::Mangrove),
            "seagrass" => Ok(Self::Seagrass),
            "saltmarsh" => Ok(Self::Saltmarsh),
            "wetland" => Ok(Self::Wetland),
            other => Err(format!("unknown ecosystem type '{other}'")),
        }
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Registered, awaiting review.
    #[default]
    Pending,
    /// Approved and accruing sequestration.
    Active,
    /// Crediting period finished.
    Completed,
    /// Registration refused.
    Rejected,
}

impl ProjectStatus {
    /// Whether a project may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active | Self::Rejected) | (Self::Active, Self::Completed)
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown project status '{other}'")),
        }
    }
}

/// Carbon accounting methodology.
///
/// The well-known codes have their own variants; any other well-formed code
/// is carried as [`Methodology::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Methodology {
    /// VM0033 tidal wetland and seagrass restoration.
    #[default]
    Vm0033,
    /// VM0007 REDD+ methodology framework.
    Vm0007,
    /// CDM AR-ACM0003 afforestation and reforestation.
    CdmArAcm0003,
    /// Any other registry code.
    Other(String),
}

impl Methodology {
    /// The registry code for this methodology.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Vm0033 => "VM0033",
            Self::Vm0007 => "VM0007",
            Self::CdmArAcm0003 => "CDM-AR-ACM0003",
            Self::Other(code) => code,
        }
    }
}

fn methodology_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(METHODOLOGY_CODE_PATTERN).expect("valid methodology pattern"))
}

impl FromStr for Methodology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        match code.as_str() {
            "VM0033" => Ok(Self::Vm0033),
            "VM0007" => Ok(Self::Vm0007),
            "CDM-AR-ACM0003" => Ok(Self::CdmArAcm0003),
            _ if methodology_code_regex().is_match(&code) => Ok(Self::Other(code)),
            _ => Err(format!("malformed methodology code '{}'", s.trim())),
        }
    }
}

impl TryFrom<String> for Methodology {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Methodology> for String {
    fn from(value: Methodology) -> Self {
        value.code().to_string()
    }
}

impl std::fmt::Display for Methodology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
}

/// A registered project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Store-assigned identifier.
    pub id: u64,
    /// Project name.
    pub name: String,
    /// Ecosystem under restoration.
    pub ecosystem: EcosystemType,
    /// Site location.
    pub coordinates: Coordinates,
    /// Project area in hectares.
    pub area_hectares: f64,
    /// Proponent organization.
    pub proponent: String,
    /// Accounting methodology.
    pub methodology: Methodology,
    /// Crediting period in years.
    pub duration_years: u32,
    /// Expected sequestration in tonnes CO2e per year.
    pub expected_annual_sequestration: f64,
    /// Free-text description.
    pub description: String,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// Cumulative tonnes CO2e sequestered.
    pub carbon_sequestered: f64,
    /// Cumulative credits issued.
    pub credits_issued: f64,
    /// When the project was registered on this device.
    pub registered_at: DateTime<Utc>,
    /// Whether the remote authority has acknowledged this record.
    pub synced: bool,
}

impl Project {
    /// Credits that could still be issued without exceeding sequestration.
    #[must_use]
    pub fn issuable_credits(&self) -> f64 {
        (self.carbon_sequestered - self.credits_issued).max(0.0)
    }
}

impl Record for Project {
    const KIND: CollectionKind = CollectionKind::Projects;

    fn id(&self) -> u64 {
        self.id
    }

    fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn mark_synced(&mut self) {
        self.synced = true;
    }
}
