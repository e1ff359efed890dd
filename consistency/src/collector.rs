//! Value collector (aggregator) role
//!
//! The collector owns the running aggregate together with two filters: a
//! counting filter of the value identities currently counted in the
//! aggregate, and a simple filter of the sources that ever reported here.
//!
//! A report only mutates the aggregate when both sides agree on the
//! membership history. A false positive on one side alone yields an
//! unacknowledged [`Outcome::Unsuccessful`], never a wrong replacement.

use crate::params::ValidatedRoles;
use crate::report::{AggregatorReport, Outcome, Report};
use murmur_core::{
    AggregateFunction, AggregateState, AggregationKind, MembershipFilter, Payload, PeerHandle,
    StateResult, Value, ValueId,
};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct ValueCollector {
    aggregate: AggregateState,
    memberships: MembershipFilter,
    membership_count: usize,
    contacts: MembershipFilter,
    contact_count: usize,
}

impl ValueCollector {
    pub fn new(kind: AggregationKind, roles: &ValidatedRoles) -> Self {
        let roles = roles.roles();
        Self {
            aggregate: AggregateState::new(kind),
            memberships: roles.aggregate_membership.build(),
            membership_count: 0,
            contacts: roles.source_contact.build(),
            contact_count: 0,
        }
    }

    pub fn aggregate(&self) -> &AggregateState {
        &self.aggregate
    }

    pub fn get(&self, function: AggregateFunction) -> Payload {
        self.aggregate.get(function)
    }

    /// Reset the aggregate and every filter
    pub fn clear(&mut self) {
        self.aggregate.reset();
        self.memberships.clear();
        self.membership_count = 0;
        self.contacts.clear();
        self.contact_count = 0;
    }

    pub fn has_contact(&self, source: &PeerHandle) -> bool {
        self.contacts.contains(source)
    }

    pub fn add_contact(&mut self, source: &PeerHandle) -> bool {
        if self.contacts.contains(source) {
            return false;
        }
        self.contacts.insert(source);
        self.contact_count += 1;
        true
    }

    pub fn has_value_membership(&self, value: ValueId) -> bool {
        self.memberships.contains(value.as_bytes())
    }

    pub fn add_value_membership(&mut self, value: ValueId) -> bool {
        if self.memberships.contains(value.as_bytes()) {
            return false;
        }
        self.memberships.insert(value.as_bytes());
        self.membership_count += 1;
        true
    }

    pub fn remove_value_membership(&mut self, value: ValueId) -> bool {
        if !self.memberships.contains(value.as_bytes()) {
            return false;
        }
        let removed = self.memberships.remove(value.as_bytes());
        if removed {
            self.membership_count = self.membership_count.saturating_sub(1);
        }
        removed
    }

    pub fn add_value(&mut self, value: &Value) -> StateResult<()> {
        self.aggregate.add(value.payload())
    }

    pub fn remove_value(&mut self, value: &Value) -> StateResult<()> {
        self.aggregate.remove(value.payload())
    }

    /// Swap `old` for `new` in the aggregate and the membership filter.
    /// Both values are checked first so a rejected swap leaves no trace.
    pub fn replace_value(&mut self, old: &Value, new: &Value) -> StateResult<()> {
        self.aggregate.validate(old.payload())?;
        self.aggregate.validate(new.payload())?;
        self.aggregate.remove(old.payload())?;
        self.aggregate.add(new.payload())?;
        self.remove_value_membership(old.id());
        self.add_value_membership(new.id());
        Ok(())
    }

    /// Run the mutual-membership check on a source's report
    pub fn receive_report(&mut self, source: &PeerHandle, report: &Report) -> AggregatorReport {
        let selected = &report.selected;

        if !self.contacts.contains(source) {
            if let Err(e) = self.add_value(selected) {
                warn!(peer = %source, error = %e, "Cannot count first report");
                return AggregatorReport::unsuccessful();
            }
            self.add_contact(source);
            self.add_value_membership(selected.id());
            debug!(peer = %source, value = %selected.id(), "First report counted");
            return AggregatorReport {
                acknowledged: true,
                outcome: Outcome::First,
                added: Some(selected.id()),
                removed: None,
            };
        }

        if !report.collector_contacted {
            // The source has no record of this collector although it reported here before
            trace!(peer = %source, "Contact histories disagree");
            return AggregatorReport::unsuccessful();
        }

        // Drop memberships this collector does not confirm
        let confirmed: Vec<&Value> = report
            .positive_memberships
            .iter()
            .filter(|value| self.has_value_membership(value.id()))
            .collect();

        let old = match confirmed.as_slice() {
            [old] => *old,
            _ => {
                trace!(
                    peer = %source,
                    confirmed = confirmed.len(),
                    "Ambiguous memberships"
                );
                return AggregatorReport::unsuccessful();
            }
        };

        if old.id() == selected.id() {
            if let Err(e) = self.aggregate.update_extremes_only(selected.payload()) {
                warn!(peer = %source, error = %e, "Cannot refresh extremes");
                return AggregatorReport::unsuccessful();
            }
            trace!(peer = %source, value = %selected.id(), "Value already counted");
            return AggregatorReport {
                acknowledged: true,
                outcome: Outcome::Double,
                added: None,
                removed: None,
            };
        }

        if let Err(e) = self.replace_value(old, selected) {
            warn!(peer = %source, error = %e, "Cannot replace stale value");
            return AggregatorReport::unsuccessful();
        }
        debug!(
            peer = %source,
            old = %old.id(),
            new = %selected.id(),
            "Stale value replaced"
        );
        AggregatorReport {
            acknowledged: true,
            outcome: Outcome::Replace,
            added: Some(selected.id()),
            removed: Some(old.id()),
        }
    }

    pub fn membership_count(&self) -> usize {
        self.membership_count
    }

    pub fn contact_count(&self) -> usize {
        self.contact_count
    }

    pub fn membership_false_positive_probability(&self) -> f64 {
        self.memberships
            .estimated_false_positive_probability(self.membership_count)
    }

    pub fn contact_false_positive_probability(&self) -> f64 {
        self.contacts
            .estimated_false_positive_probability(self.contact_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{FilterParams, FilterRoles};
    use murmur_core::{FilterKind, HashKind};
    use std::collections::HashMap;

    fn roles() -> ValidatedRoles {
        let params = |kind| FilterParams {
            kind,
            hash: HashKind::Double,
            size: 4096,
            hash_count: 4,
        };
        FilterRoles {
            value_membership: params(FilterKind::Counting),
            collector_contact: params(FilterKind::Simple),
            source_contact: params(FilterKind::Simple),
            aggregate_membership: params(FilterKind::Counting),
        }
        .validated()
        .unwrap()
    }

    fn report(selected: &Value, positive: &[&Value], contacted: bool) -> Report {
        Report {
            selected: selected.clone(),
            positive_memberships: positive.iter().map(|v| (*v).clone()).collect(),
            membership_fp: HashMap::new(),
            collector_contacted: contacted,
            contact_fp: 0.0,
        }
    }

    #[test]
    fn test_first_report_rejected_on_kind_mismatch() {
        let mut collector = ValueCollector::new(AggregationKind::Scalar, &roles());
        let source = PeerHandle::from("source");
        let value = Value::vector(vec![1.0]);

        let ack = collector.receive_report(&source, &report(&value, &[], false));
        assert_eq!(ack, AggregatorReport::unsuccessful());
        assert!(!collector.has_contact(&source));
        assert!(!collector.has_value_membership(value.id()));
        assert_eq!(collector.aggregate().count(), 0);
    }

    #[test]
    fn test_contact_histories_disagree() {
        let mut collector = ValueCollector::new(AggregationKind::Scalar, &roles());
        let source = PeerHandle::from("source");
        let value = Value::scalar(5.0);
        collector.receive_report(&source, &report(&value, &[], false));

        let ack = collector.receive_report(&source, &report(&value, &[&value], false));
        assert_eq!(ack.outcome, Outcome::Unsuccessful);
        assert!(!ack.acknowledged);
        assert_eq!(collector.aggregate().count(), 1);
    }

    #[test]
    fn test_zero_confirmed_memberships() {
        let mut collector = ValueCollector::new(AggregationKind::Scalar, &roles());
        let source = PeerHandle::from("source");
        let value = Value::scalar(5.0);
        collector.receive_report(&source, &report(&value, &[], false));

        let unknown = Value::scalar(7.0);
        let ack = collector.receive_report(&source, &report(&value, &[&unknown], true));
        assert_eq!(ack.outcome, Outcome::Unsuccessful);
        assert_eq!(collector.get(AggregateFunction::Sum), Payload::Scalar(5.0));
    }

    #[test]
    fn test_replace_keeps_counters_consistent() {
        let mut collector = ValueCollector::new(AggregationKind::Scalar, &roles());
        let source = PeerHandle::from("source");
        let old = Value::scalar(5.0);
        let new = Value::scalar(9.0);
        collector.receive_report(&source, &report(&old, &[], false));
        assert_eq!(collector.membership_count(), 1);

        collector.receive_report(&source, &report(&new, &[&old], true));
        assert_eq!(collector.membership_count(), 1);
        assert_eq!(collector.contact_count(), 1);
        assert!(collector.has_value_membership(new.id()));
        assert!(!collector.has_value_membership(old.id()));
        assert!(collector.membership_false_positive_probability() > 0.0);
    }

    #[test]
    fn test_clear() {
        let mut collector = ValueCollector::new(AggregationKind::Scalar, &roles());
        let source = PeerHandle::from("source");
        let value = Value::scalar(5.0);
        collector.receive_report(&source, &report(&value, &[], false));

        collector.clear();
        assert_eq!(collector.aggregate().count(), 0);
        assert_eq!(collector.contact_count(), 0);
        assert!(!collector.has_contact(&source));
        assert!(!collector.has_value_membership(value.id()));
    }
}
