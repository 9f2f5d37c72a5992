//! Credit ledger entries.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionKind, Record};

/// Kind of ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditOperation {
    /// New credits issued against verified sequestration.
    Issue,
    /// Credits permanently retired.
    Retire,
    /// Credits transferred to another holder.
    Trade,
}

impl std::fmt::Display for CreditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::Retire => write!(f, "retire"),
            Self::Trade => write!(f, "trade"),
        }
    }
}

impl FromStr for CreditOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issue" => Ok(Self::Issue),
            "retire" => Ok(Self::Retire),
            "trade" => Ok(Self::Trade),
            other => Err(format!("unknown credit operation '{other}'")),
        }
    }
}

/// One movement in the credit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLedgerEntry {
    /// Store-assigned identifier.
    pub id: u64,
    /// The project the credits belong to.
    pub project_id: u64,
    /// Number of credits (tonnes CO2e).
    pub quantity: f64,
    /// Price per credit.
    pub unit_price: f64,
    /// Movement kind.
    pub operation: CreditOperation,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Whether the remote authority has acknowledged this record.
    pub synced: bool,
}

impl CreditLedgerEntry {
    /// Quantity times unit price.
    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

impl Record for CreditLedgerEntry {
    const KIND: CollectionKind = CollectionKind::Credits;

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
