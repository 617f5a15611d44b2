use std::path::PathBuf;

use clap::Parser;

/// Three-node point-to-point UDP lab: two links, two client/server flows,
/// packet traces and a flow-monitor report.
#[derive(Parser, Debug)]
#[command(name = "netlab", version, about)]
pub struct Args {
    /// P2P link latency in milliseconds [default: 2.0]
    #[arg(long)]
    pub latency: Option<f64>,

    /// P2P data rate in bits per second [default: 5000000]
    #[arg(long)]
    pub rate: Option<u64>,

    /// UDP client packet interval in seconds [default: 0.05]
    #[arg(long)]
    pub interval: Option<f64>,

    /// Output file prefix [default: lab-1]
    #[arg(long)]
    pub prefix: Option<String>,

    /// Simulation RNG seed [default: 1]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Experiment file (JSON) supplying any of the above; explicit flags
    /// take precedence over file values
    #[arg(long)]
    pub config: Option<PathBuf>,
}
