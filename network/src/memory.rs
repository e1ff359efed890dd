//! In-process lossy network
//!
//! Every registered peer gets an inbox. Each envelope is dropped with the
//! configured loss probability, otherwise delivered after a delay drawn
//! uniformly from `[min_delay, max_delay]`.

use crate::error::{NetworkError, NetworkResult};
use crate::transport::{PeerSampler, Transport};
use dashmap::DashMap;
use murmur_core::PeerHandle;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::trace;

pub type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkModel {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Probability in `[0, 1]` that an envelope is lost
    pub loss: f64,
}

impl LinkModel {
    pub fn lossless(delay: Duration) -> Self {
        Self {
            min_delay: delay,
            max_delay: delay,
            loss: 0.0,
        }
    }
}

pub struct MemoryNetwork {
    inboxes: DashMap<PeerHandle, mpsc::UnboundedSender<Vec<u8>>>,
    link: LinkModel,
    rng: Mutex<StdRng>,
    sent: AtomicU64,
    lost: AtomicU64,
}

impl MemoryNetwork {
    pub fn new(link: LinkModel) -> Self {
        Self::with_rng(link, StdRng::from_os_rng())
    }

    pub fn with_seed(link: LinkModel, seed: u64) -> Self {
        Self::with_rng(link, StdRng::seed_from_u64(seed))
    }

    fn with_rng(link: LinkModel, rng: StdRng) -> Self {
        Self {
            inboxes: DashMap::new(),
            link,
            rng: Mutex::new(rng),
            sent: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        }
    }

    /// Attach a peer, replacing any previous inbox under the same handle
    pub fn register(&self, peer: PeerHandle) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(peer, tx);
        rx
    }

    pub fn unregister(&self, peer: &PeerHandle) -> bool {
        self.inboxes.remove(peer).is_some()
    }

    pub fn peers(&self) -> Vec<PeerHandle> {
        self.inboxes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inboxes.is_empty()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn lost_count(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// `None` when the envelope is lost
    fn draw_delay(&self) -> Option<Duration> {
        let mut rng = self.rng.lock();
        if self.link.loss > 0.0 && rng.random_bool(self.link.loss.min(1.0)) {
            return None;
        }
        if self.link.max_delay <= self.link.min_delay {
            return Some(self.link.min_delay);
        }
        Some(rng.random_range(self.link.min_delay..=self.link.max_delay))
    }
}

impl Transport for MemoryNetwork {
    fn send(&self, to: &PeerHandle, bytes: Vec<u8>) -> NetworkResult<()> {
        let tx = self
            .inboxes
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| NetworkError::UnknownPeer(to.clone()))?;
        self.sent.fetch_add(1, Ordering::Relaxed);

        let Some(delay) = self.draw_delay() else {
            self.lost.fetch_add(1, Ordering::Relaxed);
            trace!(to = %to, "Envelope lost");
            return Ok(());
        };

        if delay.is_zero() {
            return tx.send(bytes).map_err(|_| NetworkError::ChannelClosed);
        }
        tokio::spawn(async move {
            time::sleep(delay).await;
            // The receiver may have shut down meanwhile
            let _ = tx.send(bytes);
        });
        Ok(())
    }
}

/// Draws uniformly from every peer registered on a [`MemoryNetwork`]
pub struct DirectorySampler {
    network: Arc<MemoryNetwork>,
    own: PeerHandle,
    rng: StdRng,
}

impl DirectorySampler {
    pub fn new(network: Arc<MemoryNetwork>, own: PeerHandle) -> Self {
        Self {
            network,
            own,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(network: Arc<MemoryNetwork>, own: PeerHandle, seed: u64) -> Self {
        Self {
            network,
            own,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PeerSampler for DirectorySampler {
    fn random_peer(&mut self) -> Option<PeerHandle> {
        let peers: Vec<PeerHandle> = self
            .network
            .peers()
            .into_iter()
            .filter(|peer| *peer != self.own)
            .collect();
        peers.choose(&mut self.rng).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delivery_after_delay() {
        let network = MemoryNetwork::with_seed(LinkModel::lossless(Duration::from_millis(50)), 1);
        let mut inbox = network.register(PeerHandle::from("b"));

        let start = time::Instant::now();
        network.send(&PeerHandle::from("b"), vec![1, 2, 3]).unwrap();
        assert_eq!(inbox.recv().await, Some(vec![1, 2, 3]));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(network.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let network = MemoryNetwork::with_seed(LinkModel::lossless(Duration::ZERO), 1);
        let result = network.send(&PeerHandle::from("nobody"), vec![]);
        assert!(matches!(result, Err(NetworkError::UnknownPeer(_))));
    }

    #[tokio::test]
    async fn test_total_loss() {
        let link = LinkModel {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            loss: 1.0,
        };
        let network = MemoryNetwork::with_seed(link, 1);
        let mut inbox = network.register(PeerHandle::from("b"));
        for _ in 0..10 {
            network.send(&PeerHandle::from("b"), vec![0]).unwrap();
        }
        assert_eq!(network.lost_count(), 10);
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_directory_sampler_excludes_self() {
        let network = Arc::new(MemoryNetwork::with_seed(LinkModel::lossless(Duration::ZERO), 1));
        let _a = network.register(PeerHandle::from("a"));
        let mut sampler = DirectorySampler::with_seed(network.clone(), PeerHandle::from("a"), 2);
        assert_eq!(sampler.random_peer(), None);

        let _b = network.register(PeerHandle::from("b"));
        for _ in 0..10 {
            assert_eq!(sampler.random_peer(), Some(PeerHandle::from("b")));
        }
        assert!(network.unregister(&PeerHandle::from("b")));
        assert_eq!(network.len(), 1);
    }
}
