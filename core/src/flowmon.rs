//! Flow-level statistics.
//!
//! The monitor probes every datagram at its first-hop transmission and at
//! final delivery, classifies it by five-tuple into a dense flow id (first
//! seen = flow 1) and aggregates byte/packet counts, timing and one-way
//! delay per flow.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::Path;

use hdrhistogram::Histogram;

use crate::error::NetlabError;
use crate::packet::Packet;
use crate::time::{as_secs_f64, NANOS_PER_MICRO};

pub type FlowId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FiveTuple {
    fn of(packet: &Packet) -> Self {
        Self {
            src: packet.ipv4.src,
            dst: packet.ipv4.dst,
            protocol: packet.ipv4.protocol,
            src_port: packet.udp.src_port,
            dst_port: packet.udp.dst_port,
        }
    }
}

pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub time_first_tx: u64,
    pub time_last_tx: u64,
    pub time_first_rx: u64,
    pub time_last_rx: u64,
    pub delay_sum_ns: u64,
    pub jitter_sum_ns: u64,
    last_delay_ns: Option<u64>,
    /// One-way delay distribution, recorded in microseconds.
    pub delay_hist: Histogram<u64>,
}

impl FlowStats {
    fn new() -> Self {
        Self {
            tx_packets: 0,
            tx_bytes: 0,
            rx_packets: 0,
            rx_bytes: 0,
            time_first_tx: 0,
            time_last_tx: 0,
            time_first_rx: 0,
            time_last_rx: 0,
            delay_sum_ns: 0,
            jitter_sum_ns: 0,
            last_delay_ns: None,
            delay_hist: Histogram::new(3).expect("3 significant digits is in range"),
        }
    }

    /// Packets transmitted but not (yet) delivered.
    pub fn lost_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }

    pub fn mean_delay_ms(&self) -> f64 {
        if self.rx_packets == 0 {
            return 0.0;
        }
        self.delay_sum_ns as f64 / self.rx_packets as f64 / 1_000_000.0
    }

    /// Received bits over the first-tx to last-rx span, in Mbps
    /// (1 Mbit = 1024 * 1024 bits, matching the classic lab report).
    pub fn throughput_mbps(&self) -> f64 {
        if self.rx_bytes == 0 || self.time_last_rx <= self.time_first_tx {
            return 0.0;
        }
        let span_s = as_secs_f64(self.time_last_rx - self.time_first_tx);
        self.rx_bytes as f64 * 8.0 / span_s / 1024.0 / 1024.0
    }
}

#[derive(Default)]
pub struct FlowMonitor {
    ids: HashMap<FiveTuple, FlowId>,
    tuples: BTreeMap<FlowId, FiveTuple>,
    stats: BTreeMap<FlowId, FlowStats>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn classify(&mut self, packet: &Packet) -> FlowId {
        let tuple = FiveTuple::of(packet);
        if let Some(&id) = self.ids.get(&tuple) {
            return id;
        }
        let id = self.ids.len() as FlowId + 1;
        self.ids.insert(tuple, id);
        self.tuples.insert(id, tuple);
        self.stats.insert(id, FlowStats::new());
        id
    }

    pub fn record_tx(&mut self, time_ns: u64, packet: &Packet) {
        let id = self.classify(packet);
        let s = self.stats.get_mut(&id).expect("classified flow has stats");
        if s.tx_packets == 0 {
            s.time_first_tx = time_ns;
        }
        s.time_last_tx = time_ns;
        s.tx_packets += 1;
        s.tx_bytes += packet.ip_len() as u64;
    }

    pub fn record_rx(&mut self, time_ns: u64, packet: &Packet) {
        let id = self.classify(packet);
        let s = self.stats.get_mut(&id).expect("classified flow has stats");
        if s.rx_packets == 0 {
            s.time_first_rx = time_ns;
        }
        s.time_last_rx = time_ns;
        s.rx_packets += 1;
        s.rx_bytes += packet.ip_len() as u64;

        let delay = time_ns.saturating_sub(packet.sent_at);
        s.delay_sum_ns += delay;
        if let Some(prev) = s.last_delay_ns {
            s.jitter_sum_ns += delay.abs_diff(prev);
        }
        s.last_delay_ns = Some(delay);
        // auto-resizing histogram; recording cannot fail for nonzero values
        let _ = s.delay_hist.record(delay / NANOS_PER_MICRO);
    }

    pub fn flows(&self) -> impl Iterator<Item = (FlowId, &FiveTuple, &FlowStats)> {
        self.tuples
            .iter()
            .map(|(&id, tuple)| (id, tuple, &self.stats[&id]))
    }

    pub fn stats(&self, id: FlowId) -> Option<&FlowStats> {
        self.stats.get(&id)
    }

    pub fn find_flow(&self, tuple: &FiveTuple) -> Option<FlowId> {
        self.ids.get(tuple).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Write the full report as XML: a `FlowStats` section with the per-flow
    /// aggregates and an `Ipv4FlowClassifier` section mapping flow ids back
    /// to five-tuples.
    pub fn serialize_to_xml<P: AsRef<Path>>(&self, path: P) -> Result<(), NetlabError> {
        let file = File::create(path.as_ref()).map_err(|source| NetlabError::TraceOpen {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let mut w = BufWriter::new(file);

        writeln!(w, "<?xml version=\"1.0\" ?>")?;
        writeln!(w, "<FlowMonitor>")?;
        writeln!(w, "  <FlowStats>")?;
        for (id, _, s) in self.flows() {
            writeln!(
                w,
                "    <Flow flowId=\"{id}\" \
                 timeFirstTxPacket=\"+{}.0ns\" timeFirstRxPacket=\"+{}.0ns\" \
                 timeLastTxPacket=\"+{}.0ns\" timeLastRxPacket=\"+{}.0ns\" \
                 delaySum=\"+{}.0ns\" jitterSum=\"+{}.0ns\" \
                 txBytes=\"{}\" rxBytes=\"{}\" txPackets=\"{}\" rxPackets=\"{}\" \
                 lostPackets=\"{}\">",
                s.time_first_tx,
                s.time_first_rx,
                s.time_last_tx,
                s.time_last_rx,
                s.delay_sum_ns,
                s.jitter_sum_ns,
                s.tx_bytes,
                s.rx_bytes,
                s.tx_packets,
                s.rx_packets,
                s.lost_packets(),
            )?;
            writeln!(
                w,
                "      <delayHistogram nPackets=\"{}\" minUs=\"{}\" maxUs=\"{}\" meanUs=\"{:.1}\"/>",
                s.delay_hist.len(),
                s.delay_hist.min(),
                s.delay_hist.max(),
                s.delay_hist.mean(),
            )?;
            writeln!(w, "    </Flow>")?;
        }
        writeln!(w, "  </FlowStats>")?;
        writeln!(w, "  <Ipv4FlowClassifier>")?;
        for (id, tuple, _) in self.flows() {
            writeln!(
                w,
                "    <Flow flowId=\"{id}\" sourceAddress=\"{}\" destinationAddress=\"{}\" \
                 protocol=\"{}\" sourcePort=\"{}\" destinationPort=\"{}\"/>",
                tuple.src, tuple.dst, tuple.protocol, tuple.src_port, tuple.dst_port,
            )?;
        }
        writeln!(w, "  </Ipv4FlowClassifier>")?;
        writeln!(w, "</FlowMonitor>")?;
        w.flush()?;
        Ok(())
    }
}
