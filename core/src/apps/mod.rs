use std::any::Any;
use std::net::Ipv4Addr;

use crate::packet::Packet;

pub mod udp_client;
pub mod udp_server;

pub use udp_client::{UdpClient, UdpClientConfig};
pub use udp_server::{UdpServer, UdpServerConfig};

/// Commands an application hands back to the engine.
pub enum AppCmd {
    SendUdp {
        dst: Ipv4Addr,
        dst_port: u16,
        payload_len: u32,
        seq: u32,
    },
    TickAfter {
        delay_ns: u64,
    },
}

/// A traffic application installed on a node with a start/stop window.
/// Outside the window the engine neither ticks it nor delivers to it.
pub trait Application: Any {
    fn on_start(&mut self, now: u64) -> Vec<AppCmd> {
        let _ = now;
        Vec::new()
    }
    fn on_stop(&mut self, now: u64) {
        let _ = now;
    }
    fn on_tick(&mut self, now: u64) -> Vec<AppCmd> {
        let _ = now;
        Vec::new()
    }
    fn on_packet(&mut self, packet: &Packet, now: u64);
    fn kind(&self) -> &str;
    /// Fixed listen port. Applications without one are given an ephemeral
    /// source port at install time.
    fn bind_port(&self) -> Option<u16> {
        None
    }
    fn as_any(&self) -> &dyn Any;
}
