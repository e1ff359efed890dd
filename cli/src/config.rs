//! Simulation configuration loaded from TOML

use anyhow::{ensure, Context, Result};
use murmur_core::AggregationKind;
use murmur_network::{LinkModel, ProtocolConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub protocol: ProtocolConfig,
    pub network: NetworkConfig,
    pub application: ApplicationConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub peers: usize,
    /// Successors on the bootstrap ring each peer samples from; every
    /// registered peer when unset
    pub view_degree: Option<usize>,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default)]
    pub loss: f64,
}

impl NetworkConfig {
    pub fn link_model(&self) -> LinkModel {
        LinkModel {
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            loss: self.loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationScheme {
    /// Every component drawn uniformly from the domain
    Random,
    /// Evenly spaced over the domain
    Uniform,
    /// One draw per component from five skewed Beta distributions, scaled
    /// to the domain; possible values beyond the fifth reuse the shapes
    Beta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionScheme {
    /// Any possible value other than the current one
    Random,
    /// The next possible value, wrapping around
    Cyclical,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    pub kind: AggregationKind,
    /// Components per value, only read for vector aggregation
    #[serde(default = "default_vector_length")]
    pub vector_length: usize,
    pub possible_values: usize,
    pub domain_min: f64,
    pub domain_max: f64,
    pub generation: GenerationScheme,
    pub selection: SelectionScheme,
    /// Probability that a peer changes its selection on a change tick
    pub change_probability: f64,
    pub change_period_ms: u64,
    /// No restarts when unset
    pub restart_period_ms: Option<u64>,
}

fn default_vector_length() -> usize {
    1
}

impl ApplicationConfig {
    pub fn components(&self) -> usize {
        match self.kind {
            AggregationKind::Scalar => 1,
            AggregationKind::Vector => self.vector_length,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub duration_secs: u64,
    pub measurement_interval_ms: u64,
    /// JSON-lines file receiving one report per measurement interval
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.protocol.validate().context("Invalid [protocol] section")?;

        let network = &self.network;
        ensure!(network.peers >= 2, "network.peers must be at least 2");
        ensure!(network.view_degree != Some(0), "network.view_degree must be positive");
        ensure!(
            network.min_delay_ms <= network.max_delay_ms,
            "network.min_delay_ms exceeds network.max_delay_ms"
        );
        ensure!(
            (0.0..=1.0).contains(&network.loss),
            "network.loss must lie in [0, 1]"
        );

        let app = &self.application;
        ensure!(app.possible_values > 0, "application.possible_values must be positive");
        ensure!(app.components() > 0, "application.vector_length must be positive");
        ensure!(
            app.domain_min < app.domain_max,
            "application.domain_min must be below application.domain_max"
        );
        ensure!(
            (0.0..=1.0).contains(&app.change_probability),
            "application.change_probability must lie in [0, 1]"
        );
        ensure!(app.change_period_ms > 0, "application.change_period_ms must be positive");
        ensure!(
            app.restart_period_ms != Some(0),
            "application.restart_period_ms must be positive"
        );

        ensure!(self.run.duration_secs > 0, "run.duration_secs must be positive");
        ensure!(
            self.run.measurement_interval_ms > 0,
            "run.measurement_interval_ms must be positive"
        );
        Ok(())
    }
}
