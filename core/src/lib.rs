pub mod apps;
pub mod engine;
pub mod error;
pub mod flowmon;
pub mod packet;
pub mod time;
pub mod topology;
pub mod trace;

pub use apps::{AppCmd, Application, UdpClient, UdpClientConfig, UdpServer, UdpServerConfig};
pub use engine::{AppId, Event, EventKind, Simulation, EPHEMERAL_PORT_START};
pub use error::NetlabError;
pub use flowmon::{FiveTuple, FlowId, FlowMonitor, FlowStats};
pub use packet::{Ipv4Header, Packet, UdpHeader};
pub use topology::{
    populate_routing_tables, DeviceId, Ipv4AddressHelper, LinkId, Network, NodeId, P2pLinkConfig,
};
pub use trace::{AsciiTrace, PcapWriter};
