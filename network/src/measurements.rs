//! Per-peer measurements
//!
//! Counters accumulate between two snapshots; taking a snapshot resets them.
//! Gauges (epoch, queue sizes, filter statistics) are read at snapshot time.

use crate::protocol::MessageKind;
use chrono::{DateTime, Utc};
use murmur_consistency::Outcome;
use murmur_core::PeerHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub first: u64,
    pub double: u64,
    pub replace: u64,
    pub unsuccessful: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::First => self.first += 1,
            Outcome::Double => self.double += 1,
            Outcome::Replace => self.replace += 1,
            Outcome::Unsuccessful => self.unsuccessful += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.first + self.double + self.replace + self.unsuccessful
    }

    pub fn merge(&mut self, other: &Self) {
        self.first += other.first;
        self.double += other.double;
        self.replace += other.replace;
        self.unsuccessful += other.unsuccessful;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounts {
    pub push: u64,
    pub pull_push: u64,
    pub pull: u64,
}

impl MessageCounts {
    pub fn record(&mut self, kind: MessageKind) {
        match kind {
            MessageKind::Push => self.push += 1,
            MessageKind::PullPush => self.pull_push += 1,
            MessageKind::Pull => self.pull += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.push + self.pull_push + self.pull
    }

    pub fn merge(&mut self, other: &Self) {
        self.push += other.push;
        self.pull_push += other.pull_push;
        self.pull += other.pull;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSizes {
    pub unexploited: usize,
    pub outdated: usize,
    pub exploited: usize,
}

/// Item counts and false-positive estimates of the four filter roles
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    pub collector_contact_count: usize,
    pub collector_contact_fp: f64,
    pub value_membership_avg_count: f64,
    pub value_membership_avg_fp: f64,
    pub source_contact_count: usize,
    pub source_contact_fp: f64,
    pub aggregate_membership_count: usize,
    pub aggregate_membership_fp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub timestamp: DateTime<Utc>,
    pub peer: PeerHandle,
    pub active: bool,
    pub epoch: u64,
    pub outcomes: OutcomeCounts,
    pub sent: MessageCounts,
    pub queues: QueueSizes,
    /// Absent while the peer is inactive
    pub filters: Option<FilterStats>,
}

/// Counters owned by one peer
#[derive(Debug, Clone, Default)]
pub struct PeerMeasurements {
    outcomes: OutcomeCounts,
    sent: MessageCounts,
}

impl PeerMeasurements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&mut self, outcome: Outcome) {
        self.outcomes.record(outcome);
    }

    pub fn record_sent(&mut self, kind: MessageKind) {
        self.sent.record(kind);
    }

    pub fn outcomes(&self) -> &OutcomeCounts {
        &self.outcomes
    }

    pub fn sent(&self) -> &MessageCounts {
        &self.sent
    }

    /// Return the counters accumulated so far and start over
    pub fn take(&mut self) -> (OutcomeCounts, MessageCounts) {
        (
            std::mem::take(&mut self.outcomes),
            std::mem::take(&mut self.sent),
        )
    }
}
