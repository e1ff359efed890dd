use anyhow::{Context, Result};
use clap::Parser;
use murmur_core::AggregateFunction;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod report;
mod simulation;

use config::SimulationConfig;
use report::SimulationReport;
use simulation::Simulation;

#[derive(Parser)]
#[command(name = "murmur-sim")]
#[command(about = "Simulate gossip-based aggregation over an in-memory network")]
struct Cli {
    /// Path to the simulation configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override the number of peers
    #[arg(long)]
    peers: Option<usize>,

    /// Override the run duration in seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Override the JSON-lines report file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = SimulationConfig::load(&cli.config)?;
    if let Some(peers) = cli.peers {
        config.network.peers = peers;
    }
    if let Some(duration) = cli.duration {
        config.run.duration_secs = duration;
    }
    if let Some(output) = cli.output {
        config.run.output = Some(output);
    }

    let simulation = Simulation::start(config)?;
    let report = simulation.run().await?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    println!("\n{}", "Simulation summary".cyan().bold());
    println!(
        "{}: {}/{} active, epochs {}..={}, {:.1}s",
        "Peers".yellow().bold(),
        report.active,
        report.peers,
        report.min_epoch,
        report.max_epoch,
        report.elapsed_ms as f64 / 1000.0
    );
    println!(
        "{}: FIRST {} DOUBLE {} REPLACE {} UNSUCCESSFUL {}",
        "Outcomes".yellow().bold(),
        report.outcomes.first,
        report.outcomes.double,
        report.outcomes.replace,
        report.outcomes.unsuccessful
    );
    println!(
        "{}: PUSH {} PULL_PUSH {} PULL {}",
        "Messages".yellow().bold(),
        report.sent.push,
        report.sent.pull_push,
        report.sent.pull
    );

    println!(
        "\n{:<8} {:>14} {:>14} {:>14} {:>14} {:>10}",
        "FUNCTION".bold(),
        "TRUTH".bold(),
        "MEAN".bold(),
        "MIN".bold(),
        "MAX".bold(),
        "ERROR".bold()
    );
    for function in AggregateFunction::ALL {
        let Some(estimate) = report.estimate(function) else {
            continue;
        };
        // Vector aggregates are summarized by their first component
        let first = |values: &[f64]| values.first().copied().unwrap_or(f64::NAN);
        let error = estimate.relative_error();
        let error = if error < 0.01 {
            format!("{:.4}", error).green().to_string()
        } else {
            format!("{:.4}", error).red().to_string()
        };
        println!(
            "{:<8} {:>14.6} {:>14.6} {:>14.6} {:>14.6} {:>10}",
            function.name(),
            first(&estimate.truth),
            first(&estimate.mean),
            first(&estimate.min),
            first(&estimate.max),
            error
        );
    }
}
