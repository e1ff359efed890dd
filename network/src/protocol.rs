//! Wire messages of the three-message exchange
//!
//! Every envelope carries the sender's epoch and handle. Receivers in a
//! different epoch drop it.

use crate::error::{NetworkError, NetworkResult};
use murmur_consistency::{AggregatorReport, Report};
use murmur_core::PeerHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Push,
    PullPush,
    Pull,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Push => "PUSH",
            Self::PullPush => "PULL_PUSH",
            Self::Pull => "PULL",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// The sender's source report, addressed to the receiver as collector
    Push(Report),
    /// The sender's decision on a push, plus its own push in return
    PullPush {
        ack: AggregatorReport,
        push: Report,
    },
    /// The sender's decision on a push, ending the exchange
    Pull(AggregatorReport),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub epoch: u64,
    pub sender: PeerHandle,
    pub message: Message,
}

impl Envelope {
    pub fn new(epoch: u64, sender: PeerHandle, message: Message) -> Self {
        Self {
            epoch,
            sender,
            message,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.message {
            Message::Push(_) => MessageKind::Push,
            Message::PullPush { .. } => MessageKind::PullPush,
            Message::Pull(_) => MessageKind::Pull,
        }
    }

    pub fn encode(&self) -> NetworkResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| NetworkError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> NetworkResult<Self> {
        bincode::deserialize(bytes).map_err(|e| NetworkError::Decode(e.to_string()))
    }
}

/// An envelope waiting to be handed to the transport
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: PeerHandle,
    pub envelope: Envelope,
}
