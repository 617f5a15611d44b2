use std::any::Any;
use std::net::Ipv4Addr;

use netlab_core::time::secs;
use netlab_core::{
    populate_routing_tables, AppCmd, AppId, Application, FlowStats, Ipv4AddressHelper, LinkId,
    NodeId, P2pLinkConfig, Packet, Simulation, UdpClient, UdpClientConfig, UdpServer,
};

/// A chain topology n0 - n1 - ... with identical links, one /24 per link
/// (10.1.1.0, 10.1.2.0, ...), routing populated and a flow monitor
/// installed.
pub struct Chain {
    pub sim: Simulation,
    pub nodes: Vec<NodeId>,
    pub links: Vec<LinkId>,
    /// Device addresses per link, in device order.
    pub addrs: Vec<[Ipv4Addr; 2]>,
}

impl Chain {
    pub fn new(node_count: usize, link_cfg: P2pLinkConfig) -> Self {
        Self::with_seed(node_count, link_cfg, 1)
    }

    pub fn with_seed(node_count: usize, link_cfg: P2pLinkConfig, seed: u64) -> Self {
        let mut sim = Simulation::with_seed(seed);
        let nodes = sim.network.add_nodes(node_count);
        let mut helper = Ipv4AddressHelper::new(
            Ipv4Addr::new(10, 1, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        let mut links = Vec::new();
        let mut addrs = Vec::new();
        for i in 0..node_count.saturating_sub(1) {
            let link = sim.network.install_p2p(nodes[i], nodes[i + 1], link_cfg);
            helper.set_base(Ipv4Addr::new(10, 1, (i + 1) as u8, 0));
            addrs.push(helper.assign(&mut sim.network, link).expect("assign"));
            links.push(link);
        }
        populate_routing_tables(&mut sim.network);
        sim.install_flow_monitor();
        Self {
            sim,
            nodes,
            links,
            addrs,
        }
    }

    pub fn add_server(&mut self, node_pos: usize, port: u16, start_s: f64, stop_s: f64) -> AppId {
        self.sim.install_app(
            self.nodes[node_pos],
            Box::new(UdpServer::new(port)),
            secs(start_s),
            secs(stop_s),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_client(
        &mut self,
        node_pos: usize,
        dst: Ipv4Addr,
        dst_port: u16,
        max_packets: u32,
        interval_s: f64,
        packet_size: u32,
        start_s: f64,
        stop_s: f64,
    ) -> AppId {
        let cfg = UdpClientConfig {
            dst,
            dst_port,
            max_packets,
            interval_ns: secs(interval_s),
            packet_size,
        };
        self.sim.install_app(
            self.nodes[node_pos],
            Box::new(UdpClient::with_config(cfg)),
            secs(start_s),
            secs(stop_s),
        )
    }

    /// Run until the event queue drains (app stop events bound every run).
    pub fn run(&mut self) {
        self.sim.run().expect("simulation run");
    }

    pub fn server(&self, id: AppId) -> &UdpServer {
        self.sim.app::<UdpServer>(id).expect("server app")
    }

    pub fn flow(&self, id: u32) -> &FlowStats {
        self.sim
            .flowmon
            .as_ref()
            .expect("flow monitor installed")
            .stats(id)
            .expect("flow recorded")
    }
}

/// Sink that records every delivered packet, for header-level assertions.
pub struct CaptureSink {
    port: u16,
    pub packets: Vec<Packet>,
}

impl CaptureSink {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            packets: Vec::new(),
        }
    }
}

impl Application for CaptureSink {
    fn on_start(&mut self, _now: u64) -> Vec<AppCmd> {
        Vec::new()
    }

    fn on_packet(&mut self, packet: &Packet, _now: u64) {
        self.packets.push(packet.clone());
    }

    fn kind(&self) -> &str {
        "CaptureSink"
    }

    fn bind_port(&self) -> Option<u16> {
        Some(self.port)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
