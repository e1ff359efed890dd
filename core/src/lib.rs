//! Murmur Core Library
//!
//! Values, aggregate arithmetic and probabilistic membership filters shared by
//! every peer role of the gossip aggregation protocol.

pub mod error;
pub mod filter;
pub mod hash;
pub mod peer;
pub mod state;
pub mod value;

// Re-export main types
pub use error::{StateError, StateResult};
pub use filter::{
    false_positive_probability, BloomFilter, CountingFilter, FilterKind, MembershipFilter,
};
pub use hash::HashKind;
pub use peer::PeerHandle;
pub use state::{AggregateFunction, AggregateState};
pub use value::{AggregationKind, Payload, Value, ValueId};
