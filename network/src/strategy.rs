//! Neighbor classification and contact selection
//!
//! Sampled peers are sorted into three bounded FIFO queues according to what
//! the local value source knows about them:
//! - unexploited: never acknowledged a report of this peer
//! - outdated: acknowledged a report, but counts a stale value
//! - exploited: counts the currently selected value
//!
//! A full queue drops new entries. A peer sits in at most one queue.

use murmur_core::PeerHandle;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Which queue the next contact is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Toss a coin between unexploited and outdated first
    Random,
    /// Unexploited first, outdated as fallback
    Exploitation,
    /// Outdated first, unexploited as fallback
    Update,
}

impl SelectionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Exploitation => "exploitation",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
struct BoundedQueue {
    capacity: usize,
    peers: VecDeque<PeerHandle>,
}

impl BoundedQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            peers: VecDeque::with_capacity(capacity),
        }
    }

    fn offer(&mut self, peer: PeerHandle) -> bool {
        if self.peers.len() >= self.capacity {
            return false;
        }
        self.peers.push_back(peer);
        true
    }

    fn poll(&mut self) -> Option<PeerHandle> {
        self.peers.pop_front()
    }

    fn contains(&self, peer: &PeerHandle) -> bool {
        self.peers.contains(peer)
    }

    fn remove(&mut self, peer: &PeerHandle) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != peer);
        self.peers.len() != before
    }
}

#[derive(Debug, Clone)]
pub struct NeighborStrategy {
    policy: SelectionPolicy,
    unexploited: BoundedQueue,
    outdated: BoundedQueue,
    exploited: BoundedQueue,
}

impl NeighborStrategy {
    pub fn new(
        policy: SelectionPolicy,
        unexploited_capacity: usize,
        outdated_capacity: usize,
        exploited_capacity: usize,
    ) -> Self {
        Self {
            policy,
            unexploited: BoundedQueue::new(unexploited_capacity),
            outdated: BoundedQueue::new(outdated_capacity),
            exploited: BoundedQueue::new(exploited_capacity),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SelectionPolicy) {
        self.policy = policy;
    }

    /// Queue a sampled peer. False if already queued or the queue is full.
    pub fn classify(&mut self, peer: PeerHandle, contact_hit: bool, value_hit: bool) -> bool {
        if self.contains_neighbor(&peer) {
            return false;
        }
        match (contact_hit, value_hit) {
            (false, _) => self.unexploited.offer(peer),
            (true, false) => self.outdated.offer(peer),
            (true, true) => self.exploited.offer(peer),
        }
    }

    /// Whether a pushing peer may still change this peer's value memberships
    pub fn is_possible_aggregation(contact_hit: bool, value_hit: bool) -> bool {
        !contact_hit || !value_hit
    }

    /// Take the next contact according to the policy
    pub fn next_candidate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<PeerHandle> {
        let unexploited_first = match self.policy {
            SelectionPolicy::Random => rng.random_bool(0.5),
            SelectionPolicy::Exploitation => true,
            SelectionPolicy::Update => false,
        };

        if unexploited_first {
            self.unexploited.poll().or_else(|| self.outdated.poll())
        } else {
            self.outdated.poll().or_else(|| self.unexploited.poll())
        }
    }

    /// Drain the outdated queue and demote every exploited peer to outdated.
    /// Demoted peers beyond the outdated capacity are dropped.
    pub fn export_outdated(&mut self) -> Vec<PeerHandle> {
        let drained: Vec<PeerHandle> = self.outdated.peers.drain(..).collect();
        while let Some(peer) = self.exploited.poll() {
            self.outdated.offer(peer);
        }
        drained
    }

    pub fn import_exploited(&mut self, peer: PeerHandle) -> bool {
        self.remove_neighbor(&peer);
        self.exploited.offer(peer)
    }

    pub fn import_outdated(&mut self, peer: PeerHandle) -> bool {
        self.remove_neighbor(&peer);
        self.outdated.offer(peer)
    }

    pub fn remove_neighbor(&mut self, peer: &PeerHandle) -> bool {
        let unexploited = self.unexploited.remove(peer);
        let outdated = self.outdated.remove(peer);
        let exploited = self.exploited.remove(peer);
        unexploited || outdated || exploited
    }

    pub fn contains_neighbor(&self, peer: &PeerHandle) -> bool {
        self.unexploited.contains(peer)
            || self.outdated.contains(peer)
            || self.exploited.contains(peer)
    }

    pub fn clear(&mut self) {
        self.unexploited.peers.clear();
        self.outdated.peers.clear();
        self.exploited.peers.clear();
    }

    pub fn unexploited_len(&self) -> usize {
        self.unexploited.peers.len()
    }

    pub fn outdated_len(&self) -> usize {
        self.outdated.peers.len()
    }

    pub fn exploited_len(&self) -> usize {
        self.exploited.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn peer(i: usize) -> PeerHandle {
        PeerHandle::new(format!("10.0.0.{}", i))
    }

    fn strategy(policy: SelectionPolicy) -> NeighborStrategy {
        NeighborStrategy::new(policy, 8, 8, 8)
    }

    #[test]
    fn test_classify_not_contacted_goes_unexploited() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut strategy = strategy(SelectionPolicy::Update);
        assert!(strategy.classify(peer(1), false, true));
        assert_eq!(strategy.unexploited_len(), 1);
        assert_eq!(strategy.outdated_len(), 0);
        assert_eq!(strategy.exploited_len(), 0);

        // Outdated is preferred but empty, so the fallback finds the peer
        assert_eq!(strategy.next_candidate(&mut rng), Some(peer(1)));
        assert_eq!(strategy.next_candidate(&mut rng), None);
    }

    #[test]
    fn test_classify_rejects_duplicates_and_overflow() {
        let mut strategy = NeighborStrategy::new(SelectionPolicy::Random, 2, 2, 2);
        assert!(strategy.classify(peer(1), false, false));
        assert!(!strategy.classify(peer(1), true, false));
        assert!(strategy.classify(peer(2), false, false));
        assert!(!strategy.classify(peer(3), false, false));
        assert_eq!(strategy.unexploited_len(), 2);
        assert!(!strategy.contains_neighbor(&peer(3)));
    }

    #[test]
    fn test_policies_prefer_their_queue() {
        let mut rng = StdRng::seed_from_u64(1);

        let mut exploitation = strategy(SelectionPolicy::Exploitation);
        exploitation.classify(peer(1), true, false);
        exploitation.classify(peer(2), false, false);
        assert_eq!(exploitation.next_candidate(&mut rng), Some(peer(2)));
        assert_eq!(exploitation.next_candidate(&mut rng), Some(peer(1)));

        let mut update = strategy(SelectionPolicy::Update);
        update.classify(peer(1), true, false);
        update.classify(peer(2), false, false);
        assert_eq!(update.next_candidate(&mut rng), Some(peer(1)));
        assert_eq!(update.next_candidate(&mut rng), Some(peer(2)));
    }

    #[test]
    fn test_exploited_peers_are_never_selected() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut strategy = strategy(SelectionPolicy::Random);
        strategy.classify(peer(1), true, true);
        assert_eq!(strategy.next_candidate(&mut rng), None);
        assert_eq!(strategy.exploited_len(), 1);
    }

    #[test]
    fn test_random_policy_drains_both_queues() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut strategy = strategy(SelectionPolicy::Random);
        for i in 0..4 {
            strategy.classify(peer(i), false, false);
            strategy.classify(peer(10 + i), true, false);
        }
        let mut selected = Vec::new();
        while let Some(p) = strategy.next_candidate(&mut rng) {
            selected.push(p);
        }
        assert_eq!(selected.len(), 8);
    }

    #[test]
    fn test_export_outdated() {
        let mut strategy = strategy(SelectionPolicy::Random);
        strategy.classify(peer(1), true, false);
        strategy.classify(peer(2), true, true);
        strategy.classify(peer(3), false, false);

        let exported = strategy.export_outdated();
        assert_eq!(exported, vec![peer(1)]);
        assert_eq!(strategy.outdated_len(), 1);
        assert_eq!(strategy.exploited_len(), 0);
        assert_eq!(strategy.unexploited_len(), 1);

        assert!(strategy.import_exploited(peer(1)));
        assert_eq!(strategy.exploited_len(), 1);
    }

    #[test]
    fn test_import_moves_between_queues() {
        let mut strategy = strategy(SelectionPolicy::Random);
        strategy.classify(peer(1), false, false);
        strategy.import_exploited(peer(1));
        assert_eq!(strategy.unexploited_len(), 0);
        assert_eq!(strategy.exploited_len(), 1);

        strategy.import_outdated(peer(1));
        assert_eq!(strategy.exploited_len(), 0);
        assert_eq!(strategy.outdated_len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut strategy = strategy(SelectionPolicy::Random);
        strategy.classify(peer(1), true, false);
        strategy.classify(peer(2), false, false);
        assert!(strategy.remove_neighbor(&peer(1)));
        assert!(!strategy.remove_neighbor(&peer(1)));
        assert!(!strategy.contains_neighbor(&peer(1)));

        strategy.clear();
        assert!(!strategy.contains_neighbor(&peer(2)));
    }

    #[test]
    fn test_possible_aggregation() {
        assert!(NeighborStrategy::is_possible_aggregation(false, false));
        assert!(NeighborStrategy::is_possible_aggregation(true, false));
        assert!(!NeighborStrategy::is_possible_aggregation(true, true));
    }
}
