//! Simulated application layer
//!
//! Each peer owns an [`Application`] that decides which values it could
//! hold, which one it currently selects, and when the selection moves.

use crate::config::{ApplicationConfig, GenerationScheme, SelectionScheme};
use murmur_core::{AggregationKind, Payload, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, BetaError, Distribution};

/// `(alpha, beta)` of each possible value under [`GenerationScheme::Beta`]
const BETA_SHAPES: [(f64, f64); 5] = [
    (25.0, 5.0),
    (5.0, 25.0),
    (10.0, 5.0),
    (5.0, 10.0),
    (5.0, 5.0),
];

pub struct Application {
    config: ApplicationConfig,
    rng: StdRng,
    betas: Vec<Beta<f64>>,
    possible: Vec<Value>,
    selected: usize,
}

impl Application {
    pub fn new(config: ApplicationConfig, seed: u64) -> Result<Self, BetaError> {
        let betas = BETA_SHAPES
            .iter()
            .map(|&(alpha, beta)| Beta::new(alpha, beta))
            .collect::<Result<Vec<_>, _>>()?;
        let mut app = Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            betas,
            possible: Vec::new(),
            selected: 0,
        };
        app.regenerate();
        Ok(app)
    }

    pub fn kind(&self) -> AggregationKind {
        self.config.kind
    }

    pub fn possible_values(&self) -> &[Value] {
        &self.possible
    }

    pub fn selected(&self) -> &Value {
        &self.possible[self.selected]
    }

    /// Draw a fresh set of possible values and an initial selection
    pub fn regenerate(&mut self) -> (Vec<Value>, Value) {
        self.possible = self.generate();
        self.selected = match self.config.selection {
            SelectionScheme::Random => self.rng.random_range(0..self.possible.len()),
            SelectionScheme::Cyclical => 0,
        };
        (self.possible.clone(), self.selected().clone())
    }

    /// Flip a coin with the configured change probability; on success move
    /// to another selection and return it
    pub fn maybe_change(&mut self) -> Option<Value> {
        if !self.rng.random_bool(self.config.change_probability) {
            return None;
        }
        let next = self.next_selection();
        if next == self.selected {
            return None;
        }
        self.selected = next;
        Some(self.selected().clone())
    }

    fn next_selection(&mut self) -> usize {
        let len = self.possible.len();
        if len < 2 {
            return self.selected;
        }
        match self.config.selection {
            SelectionScheme::Cyclical => (self.selected + 1) % len,
            SelectionScheme::Random => {
                // Any index but the current one
                let pick = self.rng.random_range(0..len - 1);
                if pick >= self.selected {
                    pick + 1
                } else {
                    pick
                }
            }
        }
    }

    fn generate(&mut self) -> Vec<Value> {
        let components = self.config.components();
        let mut values = Vec::with_capacity(self.config.possible_values);
        for i in 0..self.config.possible_values {
            let point: Vec<f64> = (0..components).map(|_| self.draw(i)).collect();
            values.push(to_value(self.config.kind, point));
        }
        values
    }

    /// One component of the `i`-th possible value
    fn draw(&mut self, i: usize) -> f64 {
        let k = self.config.possible_values;
        let (min, max) = (self.config.domain_min, self.config.domain_max);
        match self.config.generation {
            GenerationScheme::Random => self.rng.random_range(min..max),
            GenerationScheme::Uniform => min + (i + 1) as f64 * (max - min) / k as f64,
            GenerationScheme::Beta => {
                let v = self.betas[i % self.betas.len()].sample(&mut self.rng);
                v * max + min - v * min
            }
        }
    }
}

fn to_value(kind: AggregationKind, point: Vec<f64>) -> Value {
    match kind {
        AggregationKind::Scalar => Value::new(Payload::Scalar(point[0])),
        AggregationKind::Vector => Value::new(Payload::Vector(point)),
    }
}
