//! Packet tracing sinks.
//!
//! ASCII traces log one line per device event with single-letter opcodes:
//! `+` enqueue, `-` dequeue (transmit start), `d` drop, `r` receive.
//! Pcap traces are classic pcap files, link type 9 (PPP), one record per
//! packet at transmit time.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::NetlabError;
use crate::packet::Packet;
use crate::time::as_secs_f64;
use crate::topology::NodeId;

pub const TRACE_ENQUEUE: char = '+';
pub const TRACE_DEQUEUE: char = '-';
pub const TRACE_DROP: char = 'd';
pub const TRACE_RECEIVE: char = 'r';

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const PCAP_SNAPLEN: u32 = 65_535;
/// DLT_PPP, matching the PPP framing in packet wire bytes.
const PCAP_LINKTYPE_PPP: u32 = 9;

pub struct AsciiTrace {
    w: BufWriter<File>,
}

impl AsciiTrace {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, NetlabError> {
        let file = File::create(path.as_ref()).map_err(|source| NetlabError::TraceOpen {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Ok(Self {
            w: BufWriter::new(file),
        })
    }

    pub fn record(
        &mut self,
        op: char,
        time_ns: u64,
        node: NodeId,
        ifindex: u32,
        packet: &Packet,
    ) -> io::Result<()> {
        writeln!(
            self.w,
            "{op} {:.9} /NodeList/{node}/DeviceList/{ifindex} \
             IPv4 {} > {} ttl {} id {} UDP {} > {} len {}",
            as_secs_f64(time_ns),
            packet.ipv4.src,
            packet.ipv4.dst,
            packet.ipv4.ttl,
            packet.ipv4.ident,
            packet.udp.src_port,
            packet.udp.dst_port,
            packet.payload_len,
        )
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

pub struct PcapWriter {
    w: BufWriter<File>,
}

impl PcapWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, NetlabError> {
        let file = File::create(path.as_ref()).map_err(|source| NetlabError::TraceOpen {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let mut w = BufWriter::new(file);
        let mut header = [0u8; 24];
        header[0..4].copy_from_slice(&PCAP_MAGIC.to_le_bytes());
        header[4..6].copy_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
        header[6..8].copy_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
        // thiszone and sigfigs stay zero
        header[16..20].copy_from_slice(&PCAP_SNAPLEN.to_le_bytes());
        header[20..24].copy_from_slice(&PCAP_LINKTYPE_PPP.to_le_bytes());
        w.write_all(&header).map_err(NetlabError::TraceWrite)?;
        Ok(Self { w })
    }

    pub fn record(&mut self, time_ns: u64, wire: &[u8]) -> io::Result<()> {
        let ts_sec = (time_ns / 1_000_000_000) as u32;
        let ts_usec = ((time_ns % 1_000_000_000) / 1_000) as u32;
        let len = wire.len() as u32;
        self.w.write_all(&ts_sec.to_le_bytes())?;
        self.w.write_all(&ts_usec.to_le_bytes())?;
        self.w.write_all(&len.to_le_bytes())?; // captured length
        self.w.write_all(&len.to_le_bytes())?; // original length
        self.w.write_all(wire)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}
