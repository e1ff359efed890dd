//! Incremental aggregate arithmetic
//!
//! An [`AggregateState`] accumulates the seven aggregation functions over
//! scalar values or over fixed-length vectors, element-wise. SUM, SUM_SQR,
//! MAX and MIN are stored; AVG and STDEV are recomputed from them on read, and
//! COUNT is shared by every element.
//!
//! Removal is O(1) and keeps no history, so a removed extreme cannot be
//! recovered: the affected MAX (MIN) element falls back to negative
//! (positive) infinity until [`AggregateState::update_extremes_only`] or a
//! later `add` brings in a surviving value.

use crate::error::{StateError, StateResult};
use crate::value::{AggregationKind, Payload};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Sum,
    SumSqr,
    Max,
    Min,
    Avg,
    Stdev,
    Count,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 7] = [
        Self::Sum,
        Self::SumSqr,
        Self::Max,
        Self::Min,
        Self::Avg,
        Self::Stdev,
        Self::Count,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::SumSqr => "SUM_SQR",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Avg => "AVG",
            Self::Stdev => "STDEV",
            Self::Count => "COUNT",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Default)]
struct Columns {
    sum: Vec<f64>,
    sum_sqr: Vec<f64>,
    max: Vec<f64>,
    min: Vec<f64>,
}

impl Columns {
    fn with_len(len: usize) -> Self {
        Self {
            sum: vec![0.0; len],
            sum_sqr: vec![0.0; len],
            max: vec![f64::NEG_INFINITY; len],
            min: vec![f64::INFINITY; len],
        }
    }

    fn len(&self) -> usize {
        self.sum.len()
    }
}

/// Running aggregate of one epoch
#[derive(Debug, Clone)]
pub struct AggregateState {
    kind: AggregationKind,
    count: u64,
    /// `None` while EMPTY
    columns: Option<Columns>,
}

impl AggregateState {
    pub fn new(kind: AggregationKind) -> Self {
        Self {
            kind,
            count: 0,
            columns: None,
        }
    }

    pub fn kind(&self) -> AggregationKind {
        self.kind
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Whether any value (or extreme) has been applied since the last reset
    pub fn is_initialized(&self) -> bool {
        self.columns.is_some()
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.columns = None;
    }

    /// Check the preconditions shared by every mutation
    pub fn validate(&self, payload: &Payload) -> StateResult<()> {
        if payload.kind() != self.kind {
            return Err(StateError::KindMismatch {
                expected: self.kind,
                kind: payload.kind(),
            });
        }
        if !payload.is_initialized() {
            return Err(StateError::Uninitialized);
        }
        if let Some(columns) = &self.columns {
            if columns.len() != payload.len() {
                return Err(StateError::LengthMismatch {
                    expected: columns.len(),
                    actual: payload.len(),
                });
            }
        }
        Ok(())
    }

    pub fn add(&mut self, payload: &Payload) -> StateResult<()> {
        self.validate(payload)?;
        let values = payload.as_slice();
        let columns = self
            .columns
            .get_or_insert_with(|| Columns::with_len(values.len()));

        for (i, v) in values.iter().enumerate() {
            columns.sum[i] += v;
            columns.sum_sqr[i] += v * v;
            columns.max[i] = columns.max[i].max(*v);
            columns.min[i] = columns.min[i].min(*v);
        }
        self.count += 1;
        Ok(())
    }

    pub fn remove(&mut self, payload: &Payload) -> StateResult<()> {
        self.validate(payload)?;
        let columns = match self.columns.as_mut() {
            Some(columns) if self.count > 0 => columns,
            _ => return Err(StateError::Empty),
        };

        for (i, v) in payload.as_slice().iter().enumerate() {
            columns.sum[i] -= v;
            columns.sum_sqr[i] -= v * v;
            if columns.max[i] == *v {
                columns.max[i] = f64::NEG_INFINITY;
            }
            if columns.min[i] == *v {
                columns.min[i] = f64::INFINITY;
            }
        }
        self.count -= 1;
        Ok(())
    }

    /// Fold the value into MAX and MIN only
    pub fn update_extremes_only(&mut self, payload: &Payload) -> StateResult<()> {
        self.validate(payload)?;
        let values = payload.as_slice();
        let columns = self
            .columns
            .get_or_insert_with(|| Columns::with_len(values.len()));

        for (i, v) in values.iter().enumerate() {
            columns.max[i] = columns.max[i].max(*v);
            columns.min[i] = columns.min[i].min(*v);
        }
        Ok(())
    }

    /// Current estimate of `function`, NaN elements while uninitialized
    pub fn get(&self, function: AggregateFunction) -> Payload {
        let elements = match &self.columns {
            None => match self.kind {
                AggregationKind::Scalar => vec![f64::NAN],
                AggregationKind::Vector => Vec::new(),
            },
            Some(columns) => (0..columns.len())
                .map(|i| self.element(columns, function, i))
                .collect(),
        };

        match self.kind {
            AggregationKind::Scalar => {
                Payload::Scalar(elements.first().copied().unwrap_or(f64::NAN))
            }
            AggregationKind::Vector => Payload::Vector(elements),
        }
    }

    fn element(&self, columns: &Columns, function: AggregateFunction, i: usize) -> f64 {
        let count = self.count as f64;
        match function {
            AggregateFunction::Sum => columns.sum[i],
            AggregateFunction::SumSqr => columns.sum_sqr[i],
            AggregateFunction::Max => columns.max[i],
            AggregateFunction::Min => columns.min[i],
            AggregateFunction::Count => count,
            AggregateFunction::Avg => columns.sum[i] / count,
            AggregateFunction::Stdev => {
                let mean = columns.sum[i] / count;
                // Cancellation can push the variance a hair below zero
                (columns.sum_sqr[i] / count - mean * mean).max(0.0).sqrt()
            }
        }
    }
}
