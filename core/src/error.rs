//! Aggregate state error types

use crate::value::AggregationKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("{kind:?} value cannot be applied to a {expected:?} aggregate")]
    KindMismatch {
        expected: AggregationKind,
        kind: AggregationKind,
    },

    #[error("Value does not carry a measurement")]
    Uninitialized,

    #[error("Vector length mismatch: aggregate holds {expected} elements, value has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Aggregate does not count any value")]
    Empty,
}

pub type StateResult<T> = std::result::Result<T, StateError>;
