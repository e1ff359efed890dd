//! Partial-view peer sampling and ring bootstrap

use crate::transport::PeerSampler;
use murmur_core::PeerHandle;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::collections::HashMap;

/// Draws uniformly from a fixed partial view
pub struct ViewSampler {
    view: Vec<PeerHandle>,
    rng: StdRng,
}

impl ViewSampler {
    pub fn new(view: Vec<PeerHandle>) -> Self {
        Self {
            view,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(view: Vec<PeerHandle>, seed: u64) -> Self {
        Self {
            view,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn view(&self) -> &[PeerHandle] {
        &self.view
    }
}

impl PeerSampler for ViewSampler {
    fn random_peer(&mut self) -> Option<PeerHandle> {
        self.view.choose(&mut self.rng).cloned()
    }
}

/// For every peer, its `degree` successors on a ring ordered as `peers`.
/// A peer never appears in its own view.
pub fn ring_topology(peers: &[PeerHandle], degree: usize) -> HashMap<PeerHandle, Vec<PeerHandle>> {
    let n = peers.len();
    let degree = degree.min(n.saturating_sub(1));
    peers
        .iter()
        .enumerate()
        .map(|(i, peer)| {
            let view = (1..=degree).map(|d| peers[(i + d) % n].clone()).collect();
            (peer.clone(), view)
        })
        .collect()
}
