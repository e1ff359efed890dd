//! Whole-network simulation driver
//!
//! Spawns one [`AggregationService`] per peer on a shared [`MemoryNetwork`]
//! and drives every peer's [`Application`] through selection changes and
//! epoch restarts. Peers sample either from the whole network or from a
//! fixed partial view bootstrapped from a ring.

use crate::app::Application;
use crate::config::SimulationConfig;
use crate::report::{PeerSample, SimulationReport};
use anyhow::{Context, Result};
use futures::future::join_all;
use murmur_core::{AggregateFunction, AggregateState, PeerHandle};
use murmur_network::{
    ring_topology, AggregationService, DirectorySampler, EpochProtocol, MemoryNetwork, PeerSampler,
    Transport, ViewSampler,
};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, Interval};
use tracing::{debug, info, warn};

struct SimulatedPeer {
    service: AggregationService,
    app: Application,
}

pub struct Simulation {
    config: SimulationConfig,
    network: Arc<MemoryNetwork>,
    peers: Vec<SimulatedPeer>,
}

impl Simulation {
    /// Build the network and spawn every peer; must run inside a tokio runtime
    pub fn start(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.run.seed.unwrap_or_else(rand::random);
        info!(peers = config.network.peers, seed, "Starting simulation");

        let network = Arc::new(MemoryNetwork::with_seed(config.network.link_model(), seed));
        let handles: Vec<PeerHandle> = (0..config.network.peers)
            .map(|i| PeerHandle::new(format!("peer-{:04}", i)))
            .collect();
        let mut views = config
            .network
            .view_degree
            .map(|degree| ring_topology(&handles, degree));
        if let Some(degree) = config.network.view_degree {
            // Exchanges are pairwise, so a peer only ever counts the values of
            // peers it samples or that sample it
            if 2 * degree + 1 < handles.len() {
                warn!(
                    degree,
                    peers = handles.len(),
                    "Partial views cannot cover the whole network"
                );
            }
        }

        let mut peers = Vec::with_capacity(handles.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let peer_seed = seed.wrapping_add(i as u64 + 1);
            let inbox = network.register(handle.clone());
            let sampler: Box<dyn PeerSampler> = match views.as_mut() {
                Some(views) => {
                    let view = views.remove(&handle).unwrap_or_default();
                    Box::new(ViewSampler::with_seed(view, peer_seed))
                }
                None => Box::new(DirectorySampler::with_seed(
                    network.clone(),
                    handle.clone(),
                    peer_seed,
                )),
            };
            let protocol =
                EpochProtocol::with_seed(handle.clone(), config.protocol.clone(), peer_seed)
                    .with_context(|| format!("Invalid protocol configuration for {}", handle))?;
            let transport: Arc<dyn Transport> = network.clone();
            let service = AggregationService::spawn(protocol, transport, inbox, sampler);
            let app = Application::new(config.application.clone(), peer_seed.rotate_left(32))
                .context("Invalid value distribution")?;
            peers.push(SimulatedPeer { service, app });
        }

        Ok(Self {
            config,
            network,
            peers,
        })
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Activate every peer with its application's current values
    pub async fn bootstrap(&self) {
        for peer in &self.peers {
            peer.service
                .request_aggregation(
                    peer.app.kind(),
                    peer.app.possible_values().to_vec(),
                    peer.app.selected().clone(),
                )
                .await;
        }
        info!(peers = self.len(), "All peers activated");
    }

    /// Give every peer a chance to move its selection; returns how many did
    pub async fn change_selections(&mut self) -> usize {
        let mut changed = 0;
        for peer in &mut self.peers {
            if let Some(value) = peer.app.maybe_change() {
                peer.service.change_selected_value(value).await;
                changed += 1;
            }
        }
        debug!(changed, "Selection changes applied");
        changed
    }

    /// Start a new epoch everywhere with freshly generated values
    pub async fn restart(&mut self) {
        for peer in &mut self.peers {
            let (possible, selected) = peer.app.regenerate();
            peer.service
                .request_aggregation(peer.app.kind(), possible, selected)
                .await;
        }
        info!(peers = self.len(), "Aggregation restarted on all peers");
    }

    /// Global aggregate over every peer's selected value
    pub fn truth(&self) -> Result<AggregateState> {
        let mut state = AggregateState::new(self.config.application.kind);
        for peer in &self.peers {
            state
                .add(peer.app.selected().payload())
                .context("Selected values disagree on shape")?;
        }
        Ok(state)
    }

    pub async fn measure(&self, elapsed: Duration) -> Result<SimulationReport> {
        let mut samples = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            let snapshot = peer.service.take_snapshot().await;
            let estimates = if snapshot.active {
                let mut estimates = Vec::with_capacity(AggregateFunction::ALL.len());
                for function in AggregateFunction::ALL {
                    if let Some(payload) = peer.service.get_aggregate(function).await {
                        estimates.push((function, payload));
                    }
                }
                Some(estimates)
            } else {
                None
            };
            samples.push(PeerSample { snapshot, estimates });
        }
        Ok(SimulationReport::build(elapsed, &self.truth()?, &samples))
    }

    /// Run for the configured duration, reporting every measurement interval.
    /// Returns the final report.
    pub async fn run(mut self) -> Result<SimulationReport> {
        let mut output = match &self.config.run.output {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?,
            ),
            None => None,
        };

        self.bootstrap().await;

        let started = Instant::now();
        let deadline = time::sleep(Duration::from_secs(self.config.run.duration_secs));
        tokio::pin!(deadline);

        let mut measurement = every(self.config.run.measurement_interval_ms);
        let mut change = every(self.config.application.change_period_ms);
        let mut restart = self.config.application.restart_period_ms.map(every);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = measurement.tick() => {
                    let report = self.measure(started.elapsed()).await?;
                    log_report(&report);
                    write_report(output.as_mut(), &report)?;
                }
                _ = change.tick() => {
                    self.change_selections().await;
                }
                _ = tick_optional(restart.as_mut()) => {
                    self.restart().await;
                }
            }
        }

        let report = self.measure(started.elapsed()).await?;
        write_report(output.as_mut(), &report)?;
        info!(
            sent = self.network.sent_count(),
            lost = self.network.lost_count(),
            "Simulation finished"
        );
        self.shutdown().await;
        Ok(report)
    }

    pub async fn shutdown(self) {
        join_all(self.peers.into_iter().map(|peer| peer.service.shutdown())).await;
    }
}

/// Ticker whose first tick fires one period from now
fn every(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms);
    time::interval_at(Instant::now() + period, period)
}

async fn tick_optional(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_report(report: &SimulationReport) {
    let scalar = |function| {
        report
            .estimate(function)
            .map(|e| (e.truth.first().copied(), e.mean.first().copied()))
            .unwrap_or((None, None))
    };
    let (count_truth, count_mean) = scalar(AggregateFunction::Count);
    let (avg_truth, avg_mean) = scalar(AggregateFunction::Avg);
    info!(
        elapsed_ms = report.elapsed_ms,
        active = report.active,
        epochs = ?(report.min_epoch, report.max_epoch),
        count_truth = ?count_truth,
        count_mean = ?count_mean,
        avg_truth = ?avg_truth,
        avg_mean = ?avg_mean,
        sent = report.sent.total(),
        outcomes = ?report.outcomes,
        "Measurement"
    );
}

fn write_report(output: Option<&mut File>, report: &SimulationReport) -> Result<()> {
    let Some(file) = output else {
        return Ok(());
    };
    let line = report.to_json_line()?;
    writeln!(file, "{}", line).context("Failed to write report")?;
    Ok(())
}
