//! Per-peer protocol coordinator
//!
//! [`EpochProtocol`] owns a peer's value source, value collector and
//! neighbor strategy and runs the Push / PullPush / Pull exchange between
//! them. It performs no I/O: every operation returns the envelopes to send,
//! and the caller decides when dissemination and sampling rounds happen.
//!
//! A peer is inactive until the application first requests aggregation.
//! Each later request clears all memberships and aggregates and bumps the
//! epoch; envelopes tagged with any other epoch are dropped on arrival.

use crate::config::ProtocolConfig;
use crate::error::ConfigError;
use crate::measurements::{FilterStats, MeasurementSnapshot, PeerMeasurements, QueueSizes};
use crate::protocol::{Envelope, Message, Outbound};
use crate::strategy::NeighborStrategy;
use crate::transport::PeerSampler;
use chrono::Utc;
use murmur_consistency::{
    AggregatorReport, Report, ValidatedRoles, ValueCollector, ValueSource,
};
use murmur_core::{AggregateFunction, AggregationKind, Payload, PeerHandle, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone)]
struct Roles {
    source: ValueSource,
    collector: ValueCollector,
}

pub struct EpochProtocol {
    handle: PeerHandle,
    config: ProtocolConfig,
    filters: ValidatedRoles,
    strategy: NeighborStrategy,
    roles: Option<Roles>,
    epoch: u64,
    measurements: PeerMeasurements,
    rng: StdRng,
}

impl EpochProtocol {
    pub fn new(handle: PeerHandle, config: ProtocolConfig) -> Result<Self, ConfigError> {
        Self::with_rng(handle, config, StdRng::from_os_rng())
    }

    /// Deterministic neighbor selection, for reproducible simulations
    pub fn with_seed(
        handle: PeerHandle,
        config: ProtocolConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(handle, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        handle: PeerHandle,
        config: ProtocolConfig,
        rng: StdRng,
    ) -> Result<Self, ConfigError> {
        let filters = config.validated_filters()?;
        let strategy = NeighborStrategy::new(
            config.policy,
            config.unexploited_capacity,
            config.outdated_capacity,
            config.exploited_capacity,
        );
        Ok(Self {
            handle,
            config,
            filters,
            strategy,
            roles: None,
            epoch: 0,
            measurements: PeerMeasurements::new(),
            rng,
        })
    }

    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.roles.is_some()
    }

    pub fn strategy(&self) -> &NeighborStrategy {
        &self.strategy
    }

    pub fn source(&self) -> Option<&ValueSource> {
        self.roles.as_ref().map(|roles| &roles.source)
    }

    pub fn collector(&self) -> Option<&ValueCollector> {
        self.roles.as_ref().map(|roles| &roles.collector)
    }

    pub fn measurements(&self) -> &PeerMeasurements {
        &self.measurements
    }

    /// Local estimate of `function`, `None` while inactive
    pub fn get_aggregate(&self, function: AggregateFunction) -> Option<Payload> {
        self.collector().map(|collector| collector.get(function))
    }

    /// Start aggregating, or restart in a new epoch when already active
    pub fn request_aggregation(
        &mut self,
        kind: AggregationKind,
        possible: Vec<Value>,
        selected: Value,
    ) {
        match self.roles.as_mut() {
            None => {
                self.roles = Some(Roles {
                    source: ValueSource::new(possible, selected, &self.filters),
                    collector: ValueCollector::new(kind, &self.filters),
                });
                self.epoch = 0;
                info!(peer = %self.handle, "Aggregation activated");
            }
            Some(roles) => {
                self.strategy.clear();
                roles.source.clear_memberships();
                if roles.collector.aggregate().kind() == kind {
                    roles.collector.clear();
                } else {
                    roles.collector = ValueCollector::new(kind, &self.filters);
                }
                roles.source.set_possible_values(possible, selected);
                self.epoch += 1;
                info!(peer = %self.handle, epoch = self.epoch, "Aggregation restarted");
            }
        }
        self.aggregate_locally();
    }

    /// Count the peer's own selected value in its own aggregate
    fn aggregate_locally(&mut self) {
        let Some(roles) = self.roles.as_mut() else {
            return;
        };
        let selected = roles.source.selected().clone();

        roles.collector.add_contact(&self.handle);
        roles.collector.add_value_membership(selected.id());
        if let Err(e) = roles.collector.add_value(&selected) {
            warn!(peer = %self.handle, error = %e, "Cannot count own value");
        }
        roles.source.add_contact(&self.handle);
        roles.source.add_value_membership(selected.id(), &self.handle);
    }

    /// Switch to another selected value within the current epoch
    pub fn change_selected_value(&mut self, value: Value) {
        let Some(roles) = self.roles.as_mut() else {
            debug!(peer = %self.handle, "Selection change ignored while inactive");
            return;
        };
        let old = roles.source.selected().clone();
        if old.id() == value.id() {
            return;
        }

        if let Err(e) = roles.collector.replace_value(&old, &value) {
            warn!(peer = %self.handle, error = %e, "Cannot swap own value in aggregate");
        }
        roles.source.remove_value_membership(old.id(), &self.handle);
        roles.source.set_selected(value.clone());
        roles.source.add_value_membership(value.id(), &self.handle);

        for peer in self.strategy.export_outdated() {
            if roles.source.has_value_membership(value.id(), &peer) {
                self.strategy.import_exploited(peer);
            } else {
                self.strategy.import_outdated(peer);
            }
        }
        debug!(peer = %self.handle, old = %old.id(), new = %value.id(), "Selected value changed");
    }

    /// One dissemination round: a push to each of up to `sessions_per_interval` candidates
    pub fn disseminate(&mut self) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        if !self.is_active() {
            return outbound;
        }

        for _ in 0..self.config.sessions_per_interval {
            let Some(peer) = self.strategy.next_candidate(&mut self.rng) else {
                break;
            };
            if let Some(push) = self.push_to(&peer) {
                outbound.push(push);
            }
        }
        outbound
    }

    fn push_to(&mut self, peer: &PeerHandle) -> Option<Outbound> {
        let report = self.roles.as_ref()?.source.build_report(peer);
        Some(self.outbound(peer.clone(), Message::Push(report)))
    }

    fn outbound(&mut self, to: PeerHandle, message: Message) -> Outbound {
        let envelope = Envelope::new(self.epoch, self.handle.clone(), message);
        self.measurements.record_sent(envelope.kind());
        trace!(
            peer = %self.handle,
            to = %to,
            kind = %envelope.kind(),
            epoch = self.epoch,
            "Sending"
        );
        Outbound { to, envelope }
    }

    /// One sampling round: classify up to `sample_size` fresh peers
    pub fn sample_from(&mut self, sampler: &mut dyn PeerSampler) {
        let Some(roles) = self.roles.as_ref() else {
            return;
        };
        let selected = roles.source.selected().id();

        for _ in 0..self.config.sample_size {
            let Some(peer) = sampler.random_peer() else {
                break;
            };
            if peer == self.handle || self.strategy.contains_neighbor(&peer) {
                continue;
            }
            let contact_hit = roles.source.has_contact(&peer);
            let value_hit = roles.source.has_value_membership(selected, &peer);
            self.strategy.classify(peer, contact_hit, value_hit);
        }
    }

    /// Process one inbound envelope, returning the reply if any
    pub fn handle_message(&mut self, envelope: Envelope) -> Option<Outbound> {
        if !self.is_active() {
            trace!(peer = %self.handle, from = %envelope.sender, "Inactive, message dropped");
            return None;
        }
        if envelope.epoch != self.epoch {
            trace!(
                peer = %self.handle,
                from = %envelope.sender,
                epoch = envelope.epoch,
                local_epoch = self.epoch,
                "Epoch mismatch, message dropped"
            );
            return None;
        }

        let sender = envelope.sender;
        match envelope.message {
            Message::Push(report) => self.on_push(sender, report),
            Message::PullPush { ack, push } => self.on_pull_push(sender, ack, push),
            Message::Pull(ack) => {
                self.on_pull(sender, ack);
                None
            }
        }
    }

    fn on_push(&mut self, sender: PeerHandle, report: Report) -> Option<Outbound> {
        let roles = self.roles.as_mut()?;
        let selected = roles.source.selected().id();
        let contact_hit = roles.source.has_contact(&sender);
        let value_hit = roles.source.has_value_membership(selected, &sender);

        let ack = roles.collector.receive_report(&sender, &report);
        self.measurements.record_outcome(ack.outcome);
        debug!(peer = %self.handle, from = %sender, outcome = %ack.outcome, "Push processed");

        if NeighborStrategy::is_possible_aggregation(contact_hit, value_hit) {
            // The pusher gets our value in the same round trip
            self.strategy.remove_neighbor(&sender);
            let push = roles.source.build_report(&sender);
            Some(self.outbound(sender, Message::PullPush { ack, push }))
        } else {
            Some(self.outbound(sender, Message::Pull(ack)))
        }
    }

    fn on_pull_push(
        &mut self,
        sender: PeerHandle,
        ack: AggregatorReport,
        push: Report,
    ) -> Option<Outbound> {
        self.on_pull(sender.clone(), ack);

        let roles = self.roles.as_mut()?;
        let reply = roles.collector.receive_report(&sender, &push);
        self.measurements.record_outcome(reply.outcome);
        debug!(
            peer = %self.handle,
            from = %sender,
            outcome = %reply.outcome,
            "Embedded push processed"
        );
        Some(self.outbound(sender, Message::Pull(reply)))
    }

    fn on_pull(&mut self, sender: PeerHandle, ack: AggregatorReport) {
        let Some(roles) = self.roles.as_mut() else {
            return;
        };
        if roles.source.apply_ack(&sender, &ack) {
            trace!(peer = %self.handle, from = %sender, outcome = %ack.outcome, "Acknowledged");
            self.strategy.import_exploited(sender);
        }
    }

    /// Snapshot of the peer's counters and gauges; counters restart from zero
    pub fn take_snapshot(&mut self) -> MeasurementSnapshot {
        let (outcomes, sent) = self.measurements.take();
        let filters = self.roles.as_ref().map(|roles| FilterStats {
            collector_contact_count: roles.source.contact_count(),
            collector_contact_fp: roles.source.contact_false_positive_probability(),
            value_membership_avg_count: roles.source.average_membership_count(),
            value_membership_avg_fp: roles.source.average_membership_false_positive_probability(),
            source_contact_count: roles.collector.contact_count(),
            source_contact_fp: roles.collector.contact_false_positive_probability(),
            aggregate_membership_count: roles.collector.membership_count(),
            aggregate_membership_fp: roles.collector.membership_false_positive_probability(),
        });

        MeasurementSnapshot {
            timestamp: Utc::now(),
            peer: self.handle.clone(),
            active: self.is_active(),
            epoch: self.epoch,
            outcomes,
            sent,
            queues: QueueSizes {
                unexploited: self.strategy.unexploited_len(),
                outdated: self.strategy.outdated_len(),
                exploited: self.strategy.exploited_len(),
            },
            filters,
        }
    }
}
