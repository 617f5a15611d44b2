//! Discrete-event engine.
//!
//! A single binary heap of time-ordered events drives everything: the
//! engine pops the earliest event, advances simulated time to it and
//! handles it, scheduling follow-ups as it goes. Ties are broken by
//! insertion order so a run is fully deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::Ipv4Addr;

use rand::prelude::*;
use tracing::debug;

use crate::apps::{AppCmd, Application};
use crate::error::NetlabError;
use crate::flowmon::FlowMonitor;
use crate::packet::Packet;
use crate::time::transmission_delay;
use crate::topology::{DeviceId, LinkId, Network, NodeId};
use crate::trace::{
    AsciiTrace, PcapWriter, TRACE_DEQUEUE, TRACE_DROP, TRACE_ENQUEUE, TRACE_RECEIVE,
};

pub type AppId = usize;

/// First source port handed to applications without a fixed listen port.
pub const EPHEMERAL_PORT_START: u16 = 49153;

#[derive(Debug, Clone)]
pub enum EventKind {
    AppStart { app: AppId },
    AppStop { app: AppId },
    AppTick { app: AppId },
    TxComplete { device: DeviceId },
    Deliver { device: DeviceId, packet: Packet },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub time: u64,
    seq: u64,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

struct AppSlot {
    node: NodeId,
    port: u16,
    running: bool,
    app: Box<dyn Application>,
}

pub struct Simulation {
    pub time: u64,
    pub network: Network,
    pub flowmon: Option<FlowMonitor>,
    events: BinaryHeap<Reverse<Event>>,
    event_seq: u64,
    apps: Vec<AppSlot>,
    next_ephemeral: u16,
    packet_uid: u64,
    stop_time: Option<u64>,
    ascii: HashMap<LinkId, AsciiTrace>,
    pcap: HashMap<LinkId, PcapWriter>,
    rng: StdRng,
}

impl Simulation {
    pub fn new() -> Self {
        Self::with_seed(1)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            time: 0,
            network: Network::new(),
            flowmon: None,
            events: BinaryHeap::new(),
            event_seq: 0,
            apps: Vec::new(),
            next_ephemeral: EPHEMERAL_PORT_START,
            packet_uid: 0,
            stop_time: None,
            ascii: HashMap::new(),
            pcap: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Install an application on `node` with an absolute start/stop window.
    pub fn install_app(
        &mut self,
        node: NodeId,
        app: Box<dyn Application>,
        start_ns: u64,
        stop_ns: u64,
    ) -> AppId {
        let port = app.bind_port().unwrap_or_else(|| {
            let p = self.next_ephemeral;
            self.next_ephemeral += 1;
            p
        });
        let id = self.apps.len();
        self.apps.push(AppSlot {
            node,
            port,
            running: false,
            app,
        });
        self.schedule_at(start_ns, EventKind::AppStart { app: id });
        self.schedule_at(stop_ns, EventKind::AppStop { app: id });
        id
    }

    /// Downcast access to an installed application, for inspection.
    pub fn app<T: Application>(&self, id: AppId) -> Option<&T> {
        self.apps.get(id)?.app.as_any().downcast_ref()
    }

    pub fn app_port(&self, id: AppId) -> Option<u16> {
        self.apps.get(id).map(|s| s.port)
    }

    pub fn enable_ascii<P: AsRef<std::path::Path>>(
        &mut self,
        link: LinkId,
        path: P,
    ) -> Result<(), NetlabError> {
        self.network.link(link)?;
        self.ascii.insert(link, AsciiTrace::create(path)?);
        Ok(())
    }

    pub fn enable_pcap<P: AsRef<std::path::Path>>(
        &mut self,
        link: LinkId,
        path: P,
    ) -> Result<(), NetlabError> {
        self.network.link(link)?;
        self.pcap.insert(link, PcapWriter::create(path)?);
        Ok(())
    }

    pub fn install_flow_monitor(&mut self) {
        self.flowmon = Some(FlowMonitor::new());
    }

    /// Events past this time are left unexecuted.
    pub fn stop_at(&mut self, time_ns: u64) {
        self.stop_time = Some(time_ns);
    }

    fn schedule_at(&mut self, time: u64, kind: EventKind) {
        let seq = self.event_seq;
        self.event_seq += 1;
        self.events.push(Reverse(Event { time, seq, kind }));
    }

    /// Drain the event queue until it empties or the stop time passes.
    pub fn run(&mut self) -> Result<(), NetlabError> {
        while let Some(Reverse(event)) = self.events.pop() {
            if let Some(stop) = self.stop_time {
                if event.time > stop {
                    self.time = stop;
                    break;
                }
            }
            self.time = event.time;
            self.handle(event.kind)?;
        }
        for sink in self.ascii.values_mut() {
            sink.flush()?;
        }
        for sink in self.pcap.values_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    fn handle(&mut self, kind: EventKind) -> Result<(), NetlabError> {
        match kind {
            EventKind::AppStart { app } => {
                self.apps[app].running = true;
                let cmds = self.apps[app].app.on_start(self.time);
                self.apply(app, cmds)
            }
            EventKind::AppStop { app } => {
                self.apps[app].running = false;
                self.apps[app].app.on_stop(self.time);
                Ok(())
            }
            EventKind::AppTick { app } => {
                if !self.apps[app].running {
                    return Ok(());
                }
                let cmds = self.apps[app].app.on_tick(self.time);
                self.apply(app, cmds)
            }
            EventKind::TxComplete { device } => {
                self.network.device_mut(device).transmitting = false;
                if !self.network.device(device).queue.is_empty() {
                    self.start_transmit(device)?;
                }
                Ok(())
            }
            EventKind::Deliver { device, packet } => self.deliver(device, packet),
        }
    }

    fn apply(&mut self, app: AppId, cmds: Vec<AppCmd>) -> Result<(), NetlabError> {
        for cmd in cmds {
            match cmd {
                AppCmd::TickAfter { delay_ns } => {
                    self.schedule_at(self.time + delay_ns, EventKind::AppTick { app });
                }
                AppCmd::SendUdp {
                    dst,
                    dst_port,
                    payload_len,
                    seq,
                } => {
                    let (node, src_port) = (self.apps[app].node, self.apps[app].port);
                    match self.send_udp(node, src_port, dst, dst_port, payload_len, seq) {
                        Ok(()) => {}
                        // an application aiming at an unreachable address is
                        // a dropped datagram, not a failed run
                        Err(NetlabError::NoRoute { node, dst }) => {
                            debug!(node, %dst, "application send had no route");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(())
    }

    /// Hand a datagram to the stack on `node`: route it, stamp the source
    /// address of the outgoing device and queue it for transmission.
    pub fn send_udp(
        &mut self,
        node: NodeId,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        payload_len: u32,
        seq: u32,
    ) -> Result<(), NetlabError> {
        let out = self
            .network
            .route(node, dst)
            .ok_or(NetlabError::NoRoute { node, dst })?;
        let src = self
            .network
            .device(out)
            .addr
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        let uid = self.packet_uid;
        self.packet_uid += 1;
        let packet = Packet::udp(uid, src, src_port, dst, dst_port, payload_len, seq, self.time);
        if let Some(fm) = &mut self.flowmon {
            fm.record_tx(self.time, &packet);
        }
        self.enqueue(out, packet)
    }

    fn enqueue(&mut self, device: DeviceId, packet: Packet) -> Result<(), NetlabError> {
        let link = self.network.device(device).link;
        let cfg = self.network.links[link].config;

        if packet.ip_len() > cfg.mtu || self.network.device(device).queue.len() >= cfg.queue_cap {
            self.network.device_mut(device).drops += 1;
            self.trace_ascii(device, TRACE_DROP, &packet)?;
            debug!(
                device,
                uid = packet.uid,
                oversize = packet.ip_len() > cfg.mtu,
                "packet dropped at enqueue"
            );
            return Ok(());
        }

        self.trace_ascii(device, TRACE_ENQUEUE, &packet)?;
        self.network.device_mut(device).queue.push_back(packet);
        if !self.network.device(device).transmitting {
            self.start_transmit(device)?;
        }
        Ok(())
    }

    fn start_transmit(&mut self, device: DeviceId) -> Result<(), NetlabError> {
        let link = self.network.device(device).link;
        let cfg = self.network.links[link].config;
        let Some(packet) = self.network.device_mut(device).queue.pop_front() else {
            return Ok(());
        };

        self.trace_ascii(device, TRACE_DEQUEUE, &packet)?;
        if let Some(sink) = self.pcap.get_mut(&link) {
            sink.record(self.time, &packet.to_wire())?;
        }

        self.network.device_mut(device).transmitting = true;
        let ser = transmission_delay(packet.frame_len(), cfg.data_rate_bps);
        self.schedule_at(self.time.saturating_add(ser), EventKind::TxComplete { device });

        if cfg.loss_rate > 0.0 && self.rng.gen::<f32>() < cfg.loss_rate {
            debug!(device, uid = packet.uid, "packet lost in flight");
            return Ok(());
        }
        let jitter = if cfg.jitter_ns > 0 {
            self.rng.gen_range(0..=cfg.jitter_ns)
        } else {
            0
        };
        let peer = self.network.device(device).peer;
        self.schedule_at(
            self.time
                .saturating_add(ser)
                .saturating_add(cfg.delay_ns)
                .saturating_add(jitter),
            EventKind::Deliver {
                device: peer,
                packet,
            },
        );
        Ok(())
    }

    fn deliver(&mut self, device: DeviceId, mut packet: Packet) -> Result<(), NetlabError> {
        self.trace_ascii(device, TRACE_RECEIVE, &packet)?;
        let node = self.network.device(device).node;

        if self.network.is_local_addr(node, packet.ipv4.dst) {
            if let Some(fm) = &mut self.flowmon {
                fm.record_rx(self.time, &packet);
            }
            if let Some(slot) = self
                .apps
                .iter_mut()
                .find(|s| s.node == node && s.running && s.port == packet.udp.dst_port)
            {
                slot.app.on_packet(&packet, self.time);
            }
            return Ok(());
        }

        // not for us: forward
        if packet.ipv4.ttl <= 1 {
            debug!(node, uid = packet.uid, "ttl expired, packet dropped");
            return Ok(());
        }
        packet.ipv4.ttl -= 1;
        match self.network.route(node, packet.ipv4.dst) {
            Some(out) => self.enqueue(out, packet),
            None => {
                debug!(node, dst = %packet.ipv4.dst, "no route, packet dropped");
                Ok(())
            }
        }
    }

    fn trace_ascii(
        &mut self,
        device: DeviceId,
        op: char,
        packet: &Packet,
    ) -> Result<(), NetlabError> {
        let dev = self.network.device(device);
        if let Some(sink) = self.ascii.get_mut(&dev.link) {
            sink.record(op, self.time, dev.node, dev.ifindex, packet)?;
        }
        Ok(())
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
