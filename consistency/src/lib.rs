//! Murmur Consistency
//!
//! The two per-peer roles of the aggregation protocol and the
//! mutual-membership check that keeps their aggregates free of double counts
//! and stale values.

pub mod collector;
pub mod params;
pub mod report;
pub mod source;

pub use collector::ValueCollector;
pub use params::{ConfigError, ConfigResult, FilterParams, FilterRoles, ValidatedRoles};
pub use report::{AggregatorReport, Outcome, Report};
pub use source::ValueSource;
