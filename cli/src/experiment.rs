//! The lab experiment: parameter resolution and topology build/run.

use std::fs;
use std::net::Ipv4Addr;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use netlab_core::time::{millis, secs};
use netlab_core::{
    populate_routing_tables, Ipv4AddressHelper, P2pLinkConfig, Simulation, UdpClient,
    UdpClientConfig, UdpServer,
};

use crate::args::Args;

pub const DEFAULT_LATENCY_MS: f64 = 2.0;
pub const DEFAULT_RATE_BPS: u64 = 5_000_000;
pub const DEFAULT_INTERVAL_S: f64 = 0.05;
pub const DEFAULT_PREFIX: &str = "lab-1";
pub const DEFAULT_SEED: u64 = 1;

const LINK_MTU: u32 = 1400;
const SERVER_PORT_1: u16 = 8000;
const SERVER_PORT_2: u16 = 8800;
const PACKET_SIZE: u32 = 1024;
const MAX_PACKETS: u32 = 320;
const SERVER_START_S: f64 = 1.0;
const CLIENT_START_S: f64 = 2.0;
const APP_STOP_S: f64 = 10.0;
const SIM_STOP_S: f64 = 11.0;

/// Optional experiment file; every field falls back to the built-in default.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentFile {
    pub latency: Option<f64>,
    pub rate: Option<u64>,
    pub interval: Option<f64>,
    pub prefix: Option<String>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Experiment {
    pub latency_ms: f64,
    pub rate_bps: u64,
    pub interval_s: f64,
    pub prefix: String,
    pub seed: u64,
}

impl Experiment {
    /// Merge CLI flags over an optional experiment file over the defaults.
    pub fn resolve(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading experiment file {}", path.display()))?;
                serde_json::from_str::<ExperimentFile>(&text)
                    .with_context(|| format!("parsing experiment file {}", path.display()))?
            }
            None => ExperimentFile::default(),
        };
        let exp = Self {
            latency_ms: args.latency.or(file.latency).unwrap_or(DEFAULT_LATENCY_MS),
            rate_bps: args.rate.or(file.rate).unwrap_or(DEFAULT_RATE_BPS),
            interval_s: args.interval.or(file.interval).unwrap_or(DEFAULT_INTERVAL_S),
            prefix: args
                .prefix
                .clone()
                .or(file.prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            seed: args.seed.or(file.seed).unwrap_or(DEFAULT_SEED),
        };
        ensure!(exp.rate_bps > 0, "data rate must be a positive bit rate");
        Ok(exp)
    }
}

/// Build the three-node lab, run it to the stop time and return the finished
/// simulation for reporting.
///
/// Topology: n0 --link-- n1 --link2-- n2, addressed 10.1.1.0/24 and
/// 10.1.2.0/24. Two UDP servers on n2 (ports 8000/8800), two UDP clients on
/// n0 aimed at n2's 10.1.2.x address.
pub fn run(exp: &Experiment) -> Result<Simulation> {
    let mut sim = Simulation::with_seed(exp.seed);

    let nodes = sim.network.add_nodes(3);
    let link_cfg = P2pLinkConfig {
        delay_ns: millis(exp.latency_ms),
        data_rate_bps: exp.rate_bps,
        mtu: LINK_MTU,
        ..P2pLinkConfig::default()
    };
    let dev = sim.network.install_p2p(nodes[0], nodes[1], link_cfg);
    let dev2 = sim.network.install_p2p(nodes[1], nodes[2], link_cfg);

    let mut ipv4 = Ipv4AddressHelper::new(
        Ipv4Addr::new(10, 1, 1, 0),
        Ipv4Addr::new(255, 255, 255, 0),
    );
    let _if1 = ipv4.assign(&mut sim.network, dev)?;
    ipv4.set_base(Ipv4Addr::new(10, 1, 2, 0));
    let if2 = ipv4.assign(&mut sim.network, dev2)?;
    populate_routing_tables(&mut sim.network);

    let server_window = (secs(SERVER_START_S), secs(APP_STOP_S));
    sim.install_app(
        nodes[2],
        Box::new(UdpServer::new(SERVER_PORT_1)),
        server_window.0,
        server_window.1,
    );
    sim.install_app(
        nodes[2],
        Box::new(UdpServer::new(SERVER_PORT_2)),
        server_window.0,
        server_window.1,
    );

    // both clients target node 2's address on the second link
    let sink_addr = if2[1];
    let client_window = (secs(CLIENT_START_S), secs(APP_STOP_S));
    for port in [SERVER_PORT_1, SERVER_PORT_2] {
        let cfg = UdpClientConfig {
            dst: sink_addr,
            dst_port: port,
            max_packets: MAX_PACKETS,
            interval_ns: secs(exp.interval_s),
            packet_size: PACKET_SIZE,
        };
        sim.install_app(
            nodes[0],
            Box::new(UdpClient::with_config(cfg)),
            client_window.0,
            client_window.1,
        );
    }

    sim.enable_ascii(dev, format!("{}-dev.tr", exp.prefix))?;
    sim.enable_pcap(dev, format!("{}-dev.pcap", exp.prefix))?;
    sim.enable_ascii(dev2, format!("{}-dev2.tr", exp.prefix))?;
    sim.enable_pcap(dev2, format!("{}-dev2.pcap", exp.prefix))?;
    sim.install_flow_monitor();

    info!(
        latency_ms = exp.latency_ms,
        rate_bps = exp.rate_bps,
        interval_s = exp.interval_s,
        seed = exp.seed,
        "starting lab run"
    );
    sim.stop_at(secs(SIM_STOP_S));
    sim.run().context("simulation run failed")?;
    info!(sim_time_s = netlab_core::time::as_secs_f64(sim.time), "run complete");

    Ok(sim)
}
