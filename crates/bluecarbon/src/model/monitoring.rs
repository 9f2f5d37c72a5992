//! Field monitoring (MRV) records.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionKind, Record};

/// Species recorded during a field survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    /// Rhizophora mucronata (loop-root mangrove).
    RhizophoraMucronata,
    /// Avicennia marina (grey mangrove).
    AvicenniaMarina,
    /// Sonneratia alba (mangrove apple).
    SonneratiaAlba,
    /// Bruguiera gymnorrhiza (large-leafed orange mangrove).
    BruguieraGymnorrhiza,
    /// Ceriops tagal (spurred mangrove).
    CeriopsTagal,
    /// Zostera marina (eelgrass).
    ZosteraMarina,
    /// Spartina alterniflora (smooth cordgrass).
    SpartinaAlterniflora,
}

impl Species {
    /// Every species in the taxonomy.
    pub const ALL: [Species; 7] = [
        Self::RhizophoraMucronata,
        Self::AvicenniaMarina,
        Self::SonneratiaAlba,
        Self::BruguieraGymnorrhiza,
        Self::CeriopsTagal,
        Self::ZosteraMarina,
        Self::SpartinaAlterniflora,
    ];

    /// Binomial name.
    #[must_use]
    pub const fn scientific_name(self) -> &'static str {
        match self {
            Self::RhizophoraMucronata => "Rhizophora mucronata",
            Self::AvicenniaMarina => "Avicennia marina",
            Self::SonneratiaAlba => "Sonneratia alba",
            Self::BruguieraGymnorrhiza => "Bruguiera gymnorrhiza",
            Self::CeriopsTagal => "Ceriops tagal",
            Self::ZosteraMarina => "Zostera marina",
            Self::SpartinaAlterniflora => "Spartina alterniflora",
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scientific_name())
    }
}

impl FromStr for Species {
    type Err = String;

    /// Accepts the binomial name or its snake_case form, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', " ");
        Self::ALL
            .into_iter()
            .find(|species| species.scientific_name().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown species '{}'", s.trim()))
    }
}

/// Optional field measurements.
///
/// A `None` means the surveyor left the field blank, which is distinct from
/// a genuine zero reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    /// Soil organic carbon density (Mg C/ha).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_carbon: Option<f64>,
    /// Normalized difference vegetation index, `[-1, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndvi: Option<f64>,
    /// Canopy height in metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canopy_height: Option<f64>,
    /// Stem diameter at breast height in centimetres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem_diameter: Option<f64>,
    /// Tree height in metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_height: Option<f64>,
    /// Seedling survival rate as a percentage, `[0, 100]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survival_rate: Option<f64>,
    /// Dominant species observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<Species>,
}

impl Measurements {
    /// Whether no measurement was recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A field observation taken against a registered project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringRecord {
    /// Store-assigned identifier.
    pub id: u64,
    /// The project this observation belongs to.
    pub project_id: u64,
    /// Calendar date of the observation.
    pub observation_date: NaiveDate,
    /// Field measurements.
    #[serde(flatten)]
    pub measurements: Measurements,
    /// Attached photo or document references, in capture order.
    #[serde(default)]
    pub media: Vec<String>,
    /// When the record was created on this device.
    pub captured_at: DateTime<Utc>,
    /// Whether the remote authority has acknowledged this record.
    pub synced: bool,
}

impl Record for MonitoringRecord {
    const KIND: CollectionKind = CollectionKind::MonitoringRecords;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_parse() {
        assert_eq!(
            "Avicennia marina".parse::<Species>().unwrap(),
            Species::AvicenniaMarina
        );
        assert_eq!(
            "rhizophora_mucronata".parse::<Species>().unwrap(),
            Species::RhizophoraMucronata
        );
        assert!("Quercus robur".parse::<Species>().is_err());
    }

    #[test]
    fn test_species_roundtrip_all() {
        for species in Species::ALL {
            assert_eq!(species.to_string().parse::<Species>().unwrap(), species);
        }
    }

    #[test]
    fn test_blank_measurements_are_omitted() {
        let record = MonitoringRecord {
            id: 1,
            project_id: 1,
            observation_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            measurements: Measurements {
                ndvi: Some(0.65),
                ..Measurements::default()
            },
            media: vec![],
            captured_at: Utc::now(),
            synced: false,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"ndvi\":0.65"));
        assert!(!json.contains("soilCarbon"));

        let back: MonitoringRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.measurements.soil_carbon, None);
        assert_eq!(back, record);
    }

    #[test]
    fn test_zero_reading_is_kept() {
        let m = Measurements {
            soil_carbon: Some(0.0),
            ..Measurements::default()
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"soilCarbon\":0.0"));
        assert!(!m.is_empty());
    }

    #[test]
    fn test_measurements_is_empty() {
        assert!(Measurements::default().is_empty());
    }
}
