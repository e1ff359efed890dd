//! Peer handles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque address of a peer, as handed out by the peer-sampling service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerHandle(String);

impl PeerHandle {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<[u8]> for PeerHandle {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for PeerHandle {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerHandle {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
