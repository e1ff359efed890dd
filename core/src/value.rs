//! Measurements contributed by peers
//!
//! A [`Value`] pairs a payload with an identifier generated at creation. Two
//! values are the same value iff their identifiers match, so copies travel
//! over the wire and act as map keys without ever comparing floats.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Stable identity of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(Uuid);

impl ValueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ValueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of the values an aggregate accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Scalar,
    Vector,
}

/// The measurement carried by a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Payload {
    pub fn kind(&self) -> AggregationKind {
        match self {
            Self::Scalar(_) => AggregationKind::Scalar,
            Self::Vector(_) => AggregationKind::Vector,
        }
    }

    /// Elements of the payload, a scalar being a one element slice
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Vector(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// A scalar holding NaN or an empty vector carries no measurement
    pub fn is_initialized(&self) -> bool {
        match self {
            Self::Scalar(v) => !v.is_nan(),
            Self::Vector(v) => !v.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    id: ValueId,
    payload: Payload,
}

impl Value {
    pub fn new(payload: Payload) -> Self {
        Self {
            id: ValueId::new(),
            payload,
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self::new(Payload::Scalar(value))
    }

    pub fn vector(values: Vec<f64>) -> Self {
        Self::new(Payload::Vector(values))
    }

    /// Rebuild a value whose identity is already known
    pub fn with_id(id: ValueId, payload: Payload) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn kind(&self) -> AggregationKind {
        self.payload.kind()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Scalar(v) => write!(f, "{}", v),
            Payload::Vector(v) => write!(f, "{:?}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = Value::scalar(5.0);
        let b = Value::scalar(5.0);
        assert_ne!(a, b);

        let copy = a.clone();
        assert_eq!(a, copy);

        let rebuilt = Value::with_id(a.id(), Payload::Scalar(7.0));
        assert_eq!(a, rebuilt);
    }

    #[test]
    fn test_payload_initialized() {
        assert!(Payload::Scalar(0.0).is_initialized());
        assert!(!Payload::Scalar(f64::NAN).is_initialized());
        assert!(Payload::Vector(vec![1.0]).is_initialized());
        assert!(!Payload::Vector(vec![]).is_initialized());
    }

    #[test]
    fn test_identity_survives_serialization() {
        let value = Value::vector(vec![1.0, 2.0]);
        let json = serde_json::to_string(&value).unwrap();
        let decoded: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.payload(), value.payload());
    }
}
