//! Reports exchanged between a value source and a value collector

use murmur_core::{Value, ValueId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What a source tells a collector about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// The source's currently selected value
    pub selected: Value,
    /// Possible values whose filter holds a positive membership of the collector
    pub positive_memberships: Vec<Value>,
    /// False-positive estimate of each positive membership's filter
    pub membership_fp: HashMap<ValueId, f64>,
    /// Whether the source's contact filter holds the collector
    pub collector_contacted: bool,
    pub contact_fp: f64,
}

/// Decision of the mutual-membership check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// First report of this source, value added
    First,
    /// Value already counted, only MAX and MIN refreshed
    Double,
    /// Stale value swapped for the selected one
    Replace,
    /// Ambiguous memberships, nothing applied
    Unsuccessful,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Self::First,
        Self::Double,
        Self::Replace,
        Self::Unsuccessful,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::Double => "DOUBLE",
            Self::Replace => "REPLACE",
            Self::Unsuccessful => "UNSUCCESSFUL",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a collector answers to a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorReport {
    pub acknowledged: bool,
    pub outcome: Outcome,
    /// Membership the source must record for the collector
    pub added: Option<ValueId>,
    /// Membership the source must drop for the collector
    pub removed: Option<ValueId>,
}

impl AggregatorReport {
    pub fn unsuccessful() -> Self {
        Self {
            acknowledged: false,
            outcome: Outcome::Unsuccessful,
            added: None,
            removed: None,
        }
    }
}
