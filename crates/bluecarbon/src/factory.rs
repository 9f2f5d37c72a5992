//! Validation and normalization of submitted forms into canonical records.
//!
//! Forms arrive as text exactly as the collaborator collected it. Builders
//! check fields in a fixed order and fail on the first offending one, naming
//! it. A numeric field left blank becomes `None`, never zero.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    Coordinates, CreditLedgerEntry, CreditOperation, EcosystemType, Measurements, Methodology,
    MonitoringRecord, Project, ProjectStatus,
};

/// Crediting period used when the form leaves duration blank.
pub const DEFAULT_DURATION_YEARS: u32 = 30;

/// Date format accepted for observation dates.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Project registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectForm {
    /// Required.
    pub name: String,
    /// Defaults to mangrove.
    pub ecosystem: String,
    /// Decimal degrees.
    pub latitude: String,
    /// Decimal degrees.
    pub longitude: String,
    /// Required, hectares, positive.
    pub area: String,
    /// Required.
    pub proponent: String,
    /// Defaults to VM0033.
    pub methodology: String,
    /// Whole years.
    pub duration: String,
    /// Tonnes CO2e per year.
    pub expected_sequestration: String,
    /// Free text.
    pub description: String,
}

/// Field monitoring form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitoringForm {
    /// Required, must name an existing project.
    pub project_id: String,
    /// `YYYY-MM-DD`; today when blank.
    pub observation_date: String,
    /// Soil carbon density.
    pub soil_carbon: String,
    /// Vegetation index.
    pub ndvi_value: String,
    /// Canopy height.
    pub canopy_height: String,
    /// Stem diameter.
    pub stem_diameter: String,
    /// Tree height.
    pub tree_height: String,
    /// Percentage.
    pub survival_rate: String,
    /// Species name.
    pub species: String,
    /// Media references in capture order.
    pub media: Vec<String>,
}

/// Credit ledger form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreditForm {
    /// Required, must name an existing project.
    pub project_id: String,
    /// Required, positive.
    pub quantity: String,
    /// Zero when blank.
    pub unit_price: String,
    /// `issue`, `retire` or `trade`.
    pub operation: String,
}

/// Build a pending project from a registration form.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the first missing or invalid field.
/// Name, area and proponent are checked first, in that order.
pub fn build_project(form: &ProjectForm, id: u64) -> Result<Project> {
    let name = required_text("name", &form.name)?;
    let area_hectares = required_number("area", &form.area)?;
    if area_hectares <= 0.0 {
        return Err(Error::validation("area", "must be greater than zero"));
    }
    let proponent = required_text("proponent", &form.proponent)?;

    let ecosystem = parse_or_default::<EcosystemType>("ecosystem", &form.ecosystem)?;
    let coordinates = Coordinates {
        latitude: optional_number("latitude", &form.latitude)?.unwrap_or_default(),
        longitude: optional_number("longitude", &form.longitude)?.unwrap_or_default(),
    };
    if !(-90.0..=90.0).contains(&coordinates.latitude) {
        return Err(Error::validation("latitude", "must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&coordinates.longitude) {
        return Err(Error::validation("longitude", "must be within [-180, 180]"));
    }

    let methodology = parse_or_default::<Methodology>("methodology", &form.methodology)?;

    let duration_years = if form.duration.trim().is_empty() {
        DEFAULT_DURATION_YEARS
    } else {
        form.duration
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|years| *years > 0)
            .ok_or_else(|| Error::validation("duration", "must be a positive whole number"))?
    };

    let expected_annual_sequestration =
        optional_number("expectedSequestration", &form.expected_sequestration)?.unwrap_or(0.0);
    if expected_annual_sequestration < 0.0 {
        return Err(Error::validation(
            "expectedSequestration",
            "must not be negative",
        ));
    }

    Ok(Project {
        id,
        name,
        ecosystem,
        coordinates,
        area_hectares,
        proponent,
        methodology,
        duration_years,
        expected_annual_sequestration,
        description: form.description.trim().to_string(),
        status: ProjectStatus::Pending,
        carbon_sequestered: 0.0,
        credits_issued: 0.0,
        registered_at: Utc::now(),
        synced: false,
    })
}

/// Build a monitoring record from a field form.
///
/// `projects` is the current project collection, used to resolve the
/// project reference.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the project id is blank, malformed, or
/// does not resolve, or if any measurement is malformed or out of range.
pub fn build_monitoring_record(
    form: &MonitoringForm,
    projects: &[Project],
    id: u64,
) -> Result<MonitoringRecord> {
    let project_id = resolve_project("projectId", &form.project_id, projects)?.id;

    let observation_date = if form.observation_date.trim().is_empty() {
        Utc::now().date_naive()
    } else {
        NaiveDate::parse_from_str(form.observation_date.trim(), DATE_FORMAT)
            .map_err(|_| Error::validation("observationDate", "expected YYYY-MM-DD"))?
    };

    let measurements = Measurements {
        soil_carbon: non_negative("soilCarbon", &form.soil_carbon)?,
        ndvi: bounded("ndviValue", &form.ndvi_value, -1.0, 1.0)?,
        canopy_height: non_negative("canopyHeight", &form.canopy_height)?,
        stem_diameter: non_negative("stemDiameter", &form.stem_diameter)?,
        tree_height: non_negative("treeHeight", &form.tree_height)?,
        survival_rate: bounded("survivalRate", &form.survival_rate, 0.0, 100.0)?,
        species: if form.species.trim().is_empty() {
            None
        } else {
            Some(
                form.species
                    .parse()
                    .map_err(|e: String| Error::validation("species", e))?,
            )
        },
    };

    let media = form
        .media
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();

    Ok(MonitoringRecord {
        id,
        project_id,
        observation_date,
        measurements,
        media,
        captured_at: Utc::now(),
        synced: false,
    })
}

/// Build a credit ledger entry.
///
/// `ledger` is the current ledger, used to bound retirements and trades by
/// the credits still outstanding for the project.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the project does not resolve, the
/// quantity or price is invalid, or the movement would break
/// `credits_issued <= carbon_sequestered` or retire/trade more than is
/// outstanding.
pub fn build_credit_entry(
    form: &CreditForm,
    projects: &[Project],
    ledger: &[CreditLedgerEntry],
    id: u64,
) -> Result<CreditLedgerEntry> {
    let project = resolve_project("projectId", &form.project_id, projects)?;

    let quantity = required_number("quantity", &form.quantity)?;
    if quantity <= 0.0 {
        return Err(Error::validation("quantity", "must be greater than zero"));
    }
    let unit_price = non_negative("unitPrice", &form.unit_price)?.unwrap_or(0.0);

    let operation: CreditOperation = required_text("operation", &form.operation)?
        .parse()
        .map_err(|e: String| Error::validation("operation", e))?;

    match operation {
        CreditOperation::Issue => {
            if !matches!(
                project.status,
                ProjectStatus::Active | ProjectStatus::Completed
            ) {
                return Err(Error::validation(
                    "projectId",
                    format!("credits cannot be issued for a {} project", project.status),
                ));
            }
            if quantity > project.issuable_credits() {
                return Err(Error::validation(
                    "quantity",
                    format!(
                        "only {:.3} credits can be issued against sequestered carbon",
                        project.issuable_credits()
                    ),
                ));
            }
        }
        CreditOperation::Retire | CreditOperation::Trade => {
            let outstanding = project.credits_issued - retired_credits(project.id, ledger);
            if quantity > outstanding {
                return Err(Error::validation(
                    "quantity",
                    format!("only {outstanding:.3} credits are outstanding"),
                ));
            }
        }
    }

    Ok(CreditLedgerEntry {
        id,
        project_id: project.id,
        quantity,
        unit_price,
        operation,
        timestamp: Utc::now(),
        synced: false,
    })
}

/// Total credits retired for a project.
#[must_use]
pub fn retired_credits(project_id: u64, ledger: &[CreditLedgerEntry]) -> f64 {
    ledger
        .iter()
        .filter(|e| e.project_id == project_id && e.operation == CreditOperation::Retire)
        .map(|e| e.quantity)
        .sum()
}

fn resolve_project<'a>(
    field: &'static str,
    text: &str,
    projects: &'a [Project],
) -> Result<&'a Project> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::validation(field, "is required"));
    }
    let id: u64 = text
        .parse()
        .map_err(|_| Error::validation(field, format!("'{text}' is not a project id")))?;
    projects
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| Error::validation(field, format!("project {id} does not exist")))
}

fn required_text(field: &'static str, text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        Err(Error::validation(field, "is required"))
    } else {
        Ok(text.to_string())
    }
}

fn required_number(field: &'static str, text: &str) -> Result<f64> {
    optional_number(field, text)?.ok_or_else(|| Error::validation(field, "is required"))
}

/// Parse a decimal field; blank means absent.
fn optional_number(field: &'static str, text: &str) -> Result<Option<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(Error::validation(field, format!("'{text}' is not a number"))),
    }
}

fn non_negative(field: &'static str, text: &str) -> Result<Option<f64>> {
    match optional_number(field, text)? {
        Some(value) if value < 0.0 => Err(Error::validation(field, "must not be negative")),
        other => Ok(other),
    }
}

fn bounded(field: &'static str, text: &str, min: f64, max: f64) -> Result<Option<f64>> {
    match optional_number(field, text)? {
        Some(value) if !(min..=max).contains(&value) => Err(Error::validation(
            field,
            format!("must be within [{min}, {max}]"),
        )),
        other => Ok(other),
    }
}

fn parse_or_default<T>(field: &'static str, text: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String> + Default,
{
    if text.trim().is_empty() {
        Ok(T::default())
    } else {
        text.parse().map_err(|e: String| Error::validation(field, e))
    }
}
