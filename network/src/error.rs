//! Network and protocol configuration errors

use murmur_core::PeerHandle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to encode envelope: {0}")]
    Encode(String),

    #[error("Failed to decode envelope: {0}")]
    Decode(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerHandle),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid filter parameters: {0}")]
    Filters(#[from] murmur_consistency::ConfigError),

    #[error("'{field}' must be greater than zero")]
    Zero { field: &'static str },
}
