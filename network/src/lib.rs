//! Murmur Network Module
//!
//! The epoch protocol that ties a peer's value source and value collector to
//! its neighbors, plus the runtime pieces around it: wire codec, neighbor
//! strategy, jittered tickers, an in-memory lossy transport and peer sampling.
pub mod config;
pub mod epoch;
pub mod error;
pub mod measurements;
pub mod memory;
pub mod protocol;
pub mod sampling;
pub mod service;
pub mod strategy;
pub mod ticker;
pub mod transport;

pub use config::ProtocolConfig;
pub use epoch::EpochProtocol;
pub use error::{ConfigError, NetworkError, NetworkResult};
pub use measurements::{
    FilterStats, MeasurementSnapshot, MessageCounts, OutcomeCounts, PeerMeasurements, QueueSizes,
};
pub use memory::{DirectorySampler, Inbox, LinkModel, MemoryNetwork};
pub use protocol::{Envelope, Message, MessageKind, Outbound};
pub use sampling::{ring_topology, ViewSampler};
pub use service::AggregationService;
pub use strategy::{NeighborStrategy, SelectionPolicy};
pub use ticker::JitteredTicker;
pub use transport::{PeerSampler, Transport};
