use std::any::Any;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{AppCmd, Application};
use crate::packet::Packet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UdpServerConfig {
    pub port: u16,
}

/// Sink for UDP datagrams on one port. Counts packets and payload bytes and
/// derives loss from gaps in the senders' sequence numbers.
pub struct UdpServer {
    pub config: UdpServerConfig,
    pub received: u64,
    pub rx_bytes: u64,
    pub lost: u64,
    next_seq: u32,
}

impl UdpServer {
    pub fn new(port: u16) -> Self {
        Self {
            config: UdpServerConfig { port },
            received: 0,
            rx_bytes: 0,
            lost: 0,
            next_seq: 0,
        }
    }
}

impl Application for UdpServer {
    fn on_start(&mut self, _now: u64) -> Vec<AppCmd> {
        Vec::new()
    }

    fn on_packet(&mut self, packet: &Packet, now: u64) {
        self.received += 1;
        self.rx_bytes += packet.payload_len as u64;
        if packet.seq >= self.next_seq {
            self.lost += (packet.seq - self.next_seq) as u64;
            self.next_seq = packet.seq + 1;
        }
        trace!(
            port = self.config.port,
            seq = packet.seq,
            now,
            "udp server receive"
        );
    }

    fn kind(&self) -> &str {
        "UdpServer"
    }

    fn bind_port(&self) -> Option<u16> {
        Some(self.config.port)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
