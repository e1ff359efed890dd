//! Collaborators the protocol runs on top of

use crate::error::NetworkResult;
use murmur_core::PeerHandle;

/// Fire-and-forget delivery of encoded envelopes
pub trait Transport: Send + Sync {
    /// Hand `bytes` over for delivery to `to`. Loss is silent.
    fn send(&self, to: &PeerHandle, bytes: Vec<u8>) -> NetworkResult<()>;
}

/// Source of random peer handles
pub trait PeerSampler: Send {
    /// A random peer, or `None` when none is known
    fn random_peer(&mut self) -> Option<PeerHandle>;
}
