//! Simulated packets.
//!
//! Payload bytes are never materialized; a packet carries its headers and a
//! payload length. Wire bytes are only synthesized on demand for pcap
//! capture, as a PPP-framed IPv4/UDP datagram (the shape a point-to-point
//! device puts on the wire).

use std::net::Ipv4Addr;

pub const PPP_HEADER_LEN: u32 = 2;
pub const IPV4_HEADER_LEN: u32 = 20;
pub const UDP_HEADER_LEN: u32 = 8;
/// Sequence number + send timestamp carried at the front of every data
/// payload, so receivers can account for loss and one-way delay.
pub const SEQ_TS_LEN: u32 = 12;

pub const PROTO_UDP: u8 = 17;
const PPP_PROTO_IPV4: u16 = 0x0021;
const DEFAULT_TTL: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
    pub ident: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub uid: u64,
    pub payload_len: u32,
    pub ipv4: Ipv4Header,
    pub udp: UdpHeader,
    pub seq: u32,
    /// Time the source application handed the datagram to the stack.
    pub sent_at: u64,
}

impl Packet {
    pub fn udp(
        uid: u64,
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        payload_len: u32,
        seq: u32,
        sent_at: u64,
    ) -> Self {
        Self {
            uid,
            payload_len,
            ipv4: Ipv4Header {
                src,
                dst,
                ttl: DEFAULT_TTL,
                protocol: PROTO_UDP,
                ident: uid as u16,
            },
            udp: UdpHeader { src_port, dst_port },
            seq,
            sent_at,
        }
    }

    /// IPv4 total length: both headers plus payload.
    pub fn ip_len(&self) -> u32 {
        IPV4_HEADER_LEN + UDP_HEADER_LEN + self.payload_len
    }

    /// On-the-wire frame length including PPP framing.
    pub fn frame_len(&self) -> u32 {
        PPP_HEADER_LEN + self.ip_len()
    }

    /// Synthesize the wire bytes for capture. Payload is zero-filled apart
    /// from the leading seq/timestamp trailer.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.frame_len() as usize);
        buf.extend_from_slice(&PPP_PROTO_IPV4.to_be_bytes());

        let ip_len = self.ip_len() as u16;
        let ip_start = buf.len();
        buf.push(0x45); // version 4, IHL 5
        buf.push(0); // DSCP/ECN
        buf.extend_from_slice(&ip_len.to_be_bytes());
        buf.extend_from_slice(&self.ipv4.ident.to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // flags, fragment offset
        buf.push(self.ipv4.ttl);
        buf.push(self.ipv4.protocol);
        buf.extend_from_slice(&[0, 0]); // checksum placeholder
        buf.extend_from_slice(&self.ipv4.src.octets());
        buf.extend_from_slice(&self.ipv4.dst.octets());
        let csum = ipv4_checksum(&buf[ip_start..ip_start + IPV4_HEADER_LEN as usize]);
        buf[ip_start + 10..ip_start + 12].copy_from_slice(&csum.to_be_bytes());

        buf.extend_from_slice(&self.udp.src_port.to_be_bytes());
        buf.extend_from_slice(&self.udp.dst_port.to_be_bytes());
        buf.extend_from_slice(&((UDP_HEADER_LEN + self.payload_len) as u16).to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // UDP checksum not computed

        if self.payload_len >= SEQ_TS_LEN {
            buf.extend_from_slice(&self.seq.to_be_bytes());
            buf.extend_from_slice(&self.sent_at.to_be_bytes());
            buf.resize(buf.len() + (self.payload_len - SEQ_TS_LEN) as usize, 0);
        } else {
            buf.resize(buf.len() + self.payload_len as usize, 0);
        }
        buf
    }
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum = 0u32;
    for chunk in header.chunks(2) {
        let word = u16::from_be_bytes([chunk[0], *chunk.get(1).unwrap_or(&0)]);
        sum += word as u32;
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
