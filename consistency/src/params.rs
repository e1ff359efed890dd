//! Filter parameters of the four membership roles
//!
//! Every field is required: there are no defaults, a deployment picks its own
//! trade-off between filter size and false-positive rate.

use murmur_core::{FilterKind, HashKind, MembershipFilter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Filter '{role}' must have at least one slot")]
    ZeroSize { role: &'static str },

    #[error("Filter '{role}' must use at least one hash function")]
    ZeroHashCount { role: &'static str },

    #[error("Filter '{role}' must be a counting filter to support removals")]
    RemovalUnsupported { role: &'static str },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Shape of a single membership filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParams {
    pub kind: FilterKind,
    pub hash: HashKind,
    pub size: usize,
    pub hash_count: u32,
}

impl FilterParams {
    pub fn build(&self) -> MembershipFilter {
        MembershipFilter::new(self.kind, self.hash, self.size, self.hash_count)
    }

    fn validate(&self, role: &'static str) -> ConfigResult<()> {
        if self.size == 0 {
            return Err(ConfigError::ZeroSize { role });
        }
        if self.hash_count == 0 {
            return Err(ConfigError::ZeroHashCount { role });
        }
        Ok(())
    }
}

/// Parameters of every filter a peer owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRoles {
    /// Per possible value, in the value source: collectors that counted it
    pub value_membership: FilterParams,
    /// In the value source: collectors that ever acknowledged this peer
    pub collector_contact: FilterParams,
    /// In the value collector: sources that ever reported to this peer
    pub source_contact: FilterParams,
    /// In the value collector: value identities counted in the aggregate
    pub aggregate_membership: FilterParams,
}

impl FilterRoles {
    pub fn validate(&self) -> ConfigResult<()> {
        self.value_membership.validate("value_membership")?;
        self.collector_contact.validate("collector_contact")?;
        self.source_contact.validate("source_contact")?;
        self.aggregate_membership.validate("aggregate_membership")?;

        // Replacements remove the stale value identity from the aggregate
        if self.aggregate_membership.kind != FilterKind::Counting {
            return Err(ConfigError::RemovalUnsupported {
                role: "aggregate_membership",
            });
        }
        Ok(())
    }

    /// Check every role once and hand back parameters that are safe to build
    pub fn validated(&self) -> ConfigResult<ValidatedRoles> {
        self.validate()?;
        Ok(ValidatedRoles(*self))
    }
}

/// [`FilterRoles`] that passed [`FilterRoles::validate`]. The value source
/// and value collector only accept these, so no filter is ever built with
/// zero slots or a removal-less aggregate membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRoles(FilterRoles);

impl ValidatedRoles {
    pub fn roles(&self) -> &FilterRoles {
        &self.0
    }
}
