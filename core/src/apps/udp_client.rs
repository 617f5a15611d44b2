use std::any::Any;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{AppCmd, Application};
use crate::packet::Packet;
use crate::time::NANOS_PER_SEC;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpClientConfig {
    pub dst: Ipv4Addr,
    pub dst_port: u16,
    pub max_packets: u32,
    pub interval_ns: u64,
    /// Payload bytes per datagram, seq/timestamp trailer included.
    pub packet_size: u32,
}

impl Default for UdpClientConfig {
    fn default() -> Self {
        Self {
            dst: Ipv4Addr::UNSPECIFIED,
            dst_port: 9,
            max_packets: 100,
            interval_ns: NANOS_PER_SEC,
            packet_size: 1024,
        }
    }
}

/// Sends `max_packets` datagrams toward a destination, one per interval,
/// starting the moment the application starts.
pub struct UdpClient {
    pub config: UdpClientConfig,
    pub sent: u32,
}

impl UdpClient {
    pub fn new(dst: Ipv4Addr, dst_port: u16) -> Self {
        Self {
            config: UdpClientConfig {
                dst,
                dst_port,
                ..UdpClientConfig::default()
            },
            sent: 0,
        }
    }

    pub fn with_config(config: UdpClientConfig) -> Self {
        Self { config, sent: 0 }
    }
}

impl Application for UdpClient {
    fn on_start(&mut self, _now: u64) -> Vec<AppCmd> {
        // first datagram goes out at the start time itself
        vec![AppCmd::TickAfter { delay_ns: 0 }]
    }

    fn on_tick(&mut self, now: u64) -> Vec<AppCmd> {
        if self.sent >= self.config.max_packets {
            return Vec::new();
        }
        let seq = self.sent;
        self.sent += 1;
        trace!(seq, now, dst = %self.config.dst, "udp client send");

        let mut cmds = vec![AppCmd::SendUdp {
            dst: self.config.dst,
            dst_port: self.config.dst_port,
            payload_len: self.config.packet_size,
            seq,
        }];
        if self.sent < self.config.max_packets {
            cmds.push(AppCmd::TickAfter {
                delay_ns: self.config.interval_ns,
            });
        }
        cmds
    }

    fn on_packet(&mut self, _packet: &Packet, _now: u64) {}

    fn kind(&self) -> &str {
        "UdpClient"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
