use anyhow::{Context, Result};

use netlab_core::{FlowStats, Simulation};

use crate::experiment::Experiment;

fn throughput_line(stats: &FlowStats) -> String {
    format!("  Throughput: {:.6} Mbps", stats.throughput_mbps())
}

/// Print the per-flow summary and write the XML flow-monitor file.
pub fn emit(sim: &Simulation, exp: &Experiment) -> Result<()> {
    let monitor = sim
        .flowmon
        .as_ref()
        .context("flow monitor was not installed")?;

    for (id, tuple, stats) in monitor.flows() {
        println!("Flow {id} ({} -> {})", tuple.src, tuple.dst);
        println!("  Tx Bytes:   {}", stats.tx_bytes);
        println!("  Rx Bytes:   {}", stats.rx_bytes);
        println!("{}", throughput_line(stats));
    }

    let path = format!("{}.flowmon", exp.prefix);
    monitor
        .serialize_to_xml(&path)
        .with_context(|| format!("writing flow monitor report {path}"))?;
    Ok(())
}
