//! Protocol configuration
//!
//! All fields are required at construction; there is no default profile.

use crate::error::ConfigError;
use crate::strategy::SelectionPolicy;
use murmur_consistency::{FilterRoles, ValidatedRoles};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Mean period between dissemination rounds
    pub dissemination_interval_ms: u64,
    /// Mean period between peer sampling rounds
    pub sampling_interval_ms: u64,
    /// Pushes attempted per dissemination round
    pub sessions_per_interval: usize,
    /// Peers requested from the sampling service per sampling round
    pub sample_size: usize,
    pub unexploited_capacity: usize,
    pub outdated_capacity: usize,
    pub exploited_capacity: usize,
    pub policy: SelectionPolicy,
    pub filters: FilterRoles,
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validated_filters().map(|_| ())
    }

    /// Validate every field and return the filter roles ready to build
    pub fn validated_filters(&self) -> Result<ValidatedRoles, ConfigError> {
        let zero = [
            ("dissemination_interval_ms", self.dissemination_interval_ms == 0),
            ("sampling_interval_ms", self.sampling_interval_ms == 0),
            ("sessions_per_interval", self.sessions_per_interval == 0),
            ("sample_size", self.sample_size == 0),
            ("unexploited_capacity", self.unexploited_capacity == 0),
            ("outdated_capacity", self.outdated_capacity == 0),
            ("exploited_capacity", self.exploited_capacity == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Zero { field: *field });
        }
        Ok(self.filters.validated()?)
    }

    pub fn dissemination_interval(&self) -> Duration {
        Duration::from_millis(self.dissemination_interval_ms)
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }
}
