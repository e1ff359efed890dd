//! Value source (disseminator) role
//!
//! The source holds the values the application may select and the selected
//! one. For every possible value it keeps a membership filter of the
//! collectors that counted it, and one contact filter of the collectors that
//! ever acknowledged a report of this peer. Item counts live next to each
//! filter since filters do not track them.

use crate::params::{FilterParams, ValidatedRoles};
use crate::report::{AggregatorReport, Report};
use murmur_core::{MembershipFilter, PeerHandle, Value, ValueId};
use std::collections::HashMap;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
struct PossibleValue {
    value: Value,
    collectors: MembershipFilter,
    count: usize,
}

#[derive(Debug, Clone)]
pub struct ValueSource {
    value_params: FilterParams,
    selected: Value,
    possible: HashMap<ValueId, PossibleValue>,
    contacts: MembershipFilter,
    contact_count: usize,
}

impl ValueSource {
    pub fn new(
        possible: impl IntoIterator<Item = Value>,
        selected: Value,
        roles: &ValidatedRoles,
    ) -> Self {
        let roles = roles.roles();
        let mut source = Self {
            value_params: roles.value_membership,
            selected: selected.clone(),
            possible: HashMap::new(),
            contacts: roles.collector_contact.build(),
            contact_count: 0,
        };
        source.set_possible_values(possible, selected);
        source
    }

    pub fn selected(&self) -> &Value {
        &self.selected
    }

    pub fn possible_values(&self) -> impl Iterator<Item = &Value> {
        self.possible.values().map(|p| &p.value)
    }

    /// Replace the possible values, recreating every filter
    pub fn set_possible_values(
        &mut self,
        values: impl IntoIterator<Item = Value>,
        selected: Value,
    ) {
        self.possible.clear();
        self.contacts.clear();
        self.contact_count = 0;
        for value in values {
            self.track(value);
        }
        self.set_selected(selected);
    }

    /// Adopt a new selected value. Memberships are left to the caller.
    pub fn set_selected(&mut self, value: Value) {
        if !self.possible.contains_key(&value.id()) {
            warn!(value = %value.id(), "Selected value is not a possible value, tracking it");
            self.track(value.clone());
        }
        self.selected = value;
    }

    fn track(&mut self, value: Value) {
        let entry = PossibleValue {
            value: value.clone(),
            collectors: self.value_params.build(),
            count: 0,
        };
        self.possible.insert(value.id(), entry);
    }

    /// Empty every filter without touching the possible values
    pub fn clear_memberships(&mut self) {
        self.contacts.clear();
        self.contact_count = 0;
        for entry in self.possible.values_mut() {
            entry.collectors.clear();
            entry.count = 0;
        }
    }

    pub fn has_contact(&self, collector: &PeerHandle) -> bool {
        self.contacts.contains(collector)
    }

    pub fn add_contact(&mut self, collector: &PeerHandle) -> bool {
        if self.contacts.contains(collector) {
            return false;
        }
        self.contacts.insert(collector);
        self.contact_count += 1;
        true
    }

    pub fn has_value_membership(&self, value: ValueId, collector: &PeerHandle) -> bool {
        self.possible
            .get(&value)
            .is_some_and(|entry| entry.collectors.contains(collector))
    }

    /// Record that `collector` counts `value`. False if unknown or already recorded.
    pub fn add_value_membership(&mut self, value: ValueId, collector: &PeerHandle) -> bool {
        match self.possible.get_mut(&value) {
            Some(entry) if !entry.collectors.contains(collector) => {
                entry.collectors.insert(collector);
                entry.count += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop the membership of `collector` for `value`. Only counting filters can.
    pub fn remove_value_membership(&mut self, value: ValueId, collector: &PeerHandle) -> bool {
        match self.possible.get_mut(&value) {
            Some(entry)
                if entry.collectors.supports_removal() && entry.collectors.contains(collector) =>
            {
                entry.collectors.remove(collector);
                entry.count = entry.count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn build_report(&self, collector: &PeerHandle) -> Report {
        let mut positive_memberships = Vec::new();
        let mut membership_fp = HashMap::new();
        for (id, entry) in &self.possible {
            if entry.collectors.contains(collector) {
                positive_memberships.push(entry.value.clone());
                membership_fp.insert(
                    *id,
                    entry.collectors.estimated_false_positive_probability(entry.count),
                );
            }
        }

        Report {
            selected: self.selected.clone(),
            positive_memberships,
            membership_fp,
            collector_contacted: self.contacts.contains(collector),
            contact_fp: self.contact_false_positive_probability(),
        }
    }

    /// Apply a collector's decision. Returns whether it was acknowledged.
    pub fn apply_ack(&mut self, collector: &PeerHandle, ack: &AggregatorReport) -> bool {
        if !ack.acknowledged {
            trace!(peer = %collector, outcome = %ack.outcome, "Report not acknowledged");
            return false;
        }

        self.add_contact(collector);
        if let Some(removed) = ack.removed {
            self.remove_value_membership(removed, collector);
        }
        if let Some(added) = ack.added {
            self.add_value_membership(added, collector);
        }
        true
    }

    pub fn contact_count(&self) -> usize {
        self.contact_count
    }

    pub fn contact_false_positive_probability(&self) -> f64 {
        self.contacts
            .estimated_false_positive_probability(self.contact_count)
    }

    pub fn membership_count(&self, value: ValueId) -> Option<usize> {
        self.possible.get(&value).map(|entry| entry.count)
    }

    pub fn membership_false_positive_probabilities(&self) -> HashMap<ValueId, f64> {
        self.possible
            .iter()
            .map(|(id, entry)| {
                (
                    *id,
                    entry.collectors.estimated_false_positive_probability(entry.count),
                )
            })
            .collect()
    }

    pub fn average_membership_count(&self) -> f64 {
        if self.possible.is_empty() {
            return 0.0;
        }
        let total: usize = self.possible.values().map(|entry| entry.count).sum();
        total as f64 / self.possible.len() as f64
    }

    pub fn average_membership_false_positive_probability(&self) -> f64 {
        if self.possible.is_empty() {
            return 0.0;
        }
        let total: f64 = self.membership_false_positive_probabilities().values().sum();
        total / self.possible.len() as f64
    }
}
