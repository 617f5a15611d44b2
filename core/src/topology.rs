//! Topology: nodes joined by point-to-point links, IPv4 address assignment
//! and global routing.
//!
//! A link always has exactly two devices, one per endpoint node. Each device
//! owns a drop-tail transmit queue; the engine drains it one packet at a
//! time, charging serialization time at the link data rate before the
//! propagation delay.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NetlabError;
use crate::packet::Packet;
use crate::time::NANOS_PER_MILLI;

pub type NodeId = u32;
pub type LinkId = usize;
pub type DeviceId = usize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct P2pLinkConfig {
    /// One-way propagation delay.
    pub delay_ns: u64,
    pub data_rate_bps: u64,
    /// Maximum IPv4 packet size the device accepts; larger packets are
    /// dropped at enqueue (no fragmentation).
    pub mtu: u32,
    /// Drop-tail transmit queue capacity, in packets.
    pub queue_cap: usize,
    /// Probability that a transmitted packet is lost in flight (0.0 - 1.0).
    pub loss_rate: f32,
    /// Amplitude of random extra propagation delay.
    pub jitter_ns: u64,
}

impl Default for P2pLinkConfig {
    fn default() -> Self {
        Self {
            delay_ns: 10 * NANOS_PER_MILLI,
            data_rate_bps: 5_000_000,
            mtu: 1500,
            queue_cap: 100,
            loss_rate: 0.0,
            jitter_ns: 0,
        }
    }
}

#[derive(Debug)]
pub struct Device {
    pub id: DeviceId,
    pub node: NodeId,
    pub link: LinkId,
    pub peer: DeviceId,
    /// Index of this device within its node, for trace output.
    pub ifindex: u32,
    pub addr: Option<Ipv4Addr>,
    pub mask: Option<Ipv4Addr>,
    pub queue: VecDeque<Packet>,
    pub transmitting: bool,
    pub drops: u64,
}

#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub config: P2pLinkConfig,
    pub devices: [DeviceId; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub device: DeviceId,
}

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub devices: Vec<DeviceId>,
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Default)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub devices: Vec<Device>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            id,
            devices: Vec::new(),
            routes: Vec::new(),
        });
        id
    }

    pub fn add_nodes(&mut self, count: usize) -> Vec<NodeId> {
        (0..count).map(|_| self.add_node()).collect()
    }

    /// Join `a` and `b` with a full-duplex point-to-point link, creating one
    /// device on each node.
    pub fn install_p2p(&mut self, a: NodeId, b: NodeId, config: P2pLinkConfig) -> LinkId {
        let link_id = self.links.len();
        let dev_a = self.attach_device(a, link_id);
        let dev_b = self.attach_device(b, link_id);
        self.devices[dev_a].peer = dev_b;
        self.devices[dev_b].peer = dev_a;
        self.links.push(Link {
            id: link_id,
            config,
            devices: [dev_a, dev_b],
        });
        debug!(
            link = link_id,
            node_a = a,
            node_b = b,
            delay_ns = config.delay_ns,
            rate_bps = config.data_rate_bps,
            "installed point-to-point link"
        );
        link_id
    }

    fn attach_device(&mut self, node: NodeId, link: LinkId) -> DeviceId {
        let id = self.devices.len();
        let ifindex = self.nodes[node as usize].devices.len() as u32;
        self.devices.push(Device {
            id,
            node,
            link,
            peer: id, // patched by install_p2p
            ifindex,
            addr: None,
            mask: None,
            queue: VecDeque::new(),
            transmitting: false,
            drops: 0,
        });
        self.nodes[node as usize].devices.push(id);
        id
    }

    pub fn link(&self, id: LinkId) -> Result<&Link, NetlabError> {
        self.links.get(id).ok_or(NetlabError::UnknownLink(id))
    }

    pub fn device(&self, id: DeviceId) -> &Device {
        &self.devices[id]
    }

    pub fn device_mut(&mut self, id: DeviceId) -> &mut Device {
        &mut self.devices[id]
    }

    /// True when `addr` is assigned to one of `node`'s devices.
    pub fn is_local_addr(&self, node: NodeId, addr: Ipv4Addr) -> bool {
        self.nodes[node as usize]
            .devices
            .iter()
            .any(|&d| self.devices[d].addr == Some(addr))
    }

    /// Longest-prefix-match route lookup.
    pub fn route(&self, node: NodeId, dst: Ipv4Addr) -> Option<DeviceId> {
        self.nodes[node as usize]
            .routes
            .iter()
            .filter(|r| mask_apply(dst, r.mask) == r.network)
            .max_by_key(|r| u32::from(r.mask).count_ones())
            .map(|r| r.device)
    }
}

fn mask_apply(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(mask))
}

/// Assigns consecutive host addresses out of one network prefix, two per
/// point-to-point link.
pub struct Ipv4AddressHelper {
    base: Ipv4Addr,
    mask: Ipv4Addr,
    next_host: u32,
}

impl Ipv4AddressHelper {
    pub fn new(base: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self {
            base: mask_apply(base, mask),
            mask,
            next_host: 1,
        }
    }

    /// Restart allocation on a new network prefix.
    pub fn set_base(&mut self, base: Ipv4Addr) {
        self.base = mask_apply(base, self.mask);
        self.next_host = 1;
    }

    /// Assign the next two host addresses to the endpoints of `link`,
    /// returned in device order.
    pub fn assign(
        &mut self,
        net: &mut Network,
        link: LinkId,
    ) -> Result<[Ipv4Addr; 2], NetlabError> {
        let devices = net.link(link)?.devices;
        let mut out = [Ipv4Addr::UNSPECIFIED; 2];
        for (slot, dev) in devices.into_iter().enumerate() {
            let host_bits = !u32::from(self.mask);
            if self.next_host >= host_bits {
                return Err(NetlabError::AddressExhausted {
                    base: self.base,
                    mask: self.mask,
                });
            }
            let addr = Ipv4Addr::from(u32::from(self.base) | self.next_host);
            self.next_host += 1;
            let device = net.device_mut(dev);
            device.addr = Some(addr);
            device.mask = Some(self.mask);
            out[slot] = addr;
        }
        debug!(link, a = %out[0], b = %out[1], "assigned link addresses");
        Ok(out)
    }
}

/// Compute routes on every node for every assigned network prefix, by
/// breadth-first search over the link graph. Equivalent to global routing:
/// each node learns the outgoing device toward the nearest owner of each
/// prefix.
pub fn populate_routing_tables(net: &mut Network) {
    // (network, mask, owner) for every addressed device
    let prefixes: Vec<(Ipv4Addr, Ipv4Addr, NodeId)> = net
        .devices
        .iter()
        .filter_map(|d| {
            let (addr, mask) = (d.addr?, d.mask?);
            Some((mask_apply(addr, mask), mask, d.node))
        })
        .collect();

    for node_idx in 0..net.nodes.len() {
        let source = node_idx as NodeId;
        let (dist, first_dev) = bfs(net, source);

        // order owners of each prefix by distance; the nearest wins
        let mut candidates: Vec<(Ipv4Addr, Ipv4Addr, u32, NodeId)> = prefixes
            .iter()
            .filter_map(|&(network, mask, owner)| {
                dist[owner as usize].map(|d| (network, mask, d, owner))
            })
            .collect();
        candidates.sort_by_key(|&(network, mask, d, owner)| {
            (u32::from(network), u32::from(mask), d, owner)
        });

        let mut routes: Vec<RouteEntry> = Vec::new();
        for (network, mask, _d, owner) in candidates {
            if routes.iter().any(|r| r.network == network && r.mask == mask) {
                continue;
            }
            let device = if owner == source {
                // directly attached: route via the local device on that prefix
                net.nodes[node_idx].devices.iter().copied().find(|&dev| {
                    net.devices[dev]
                        .addr
                        .zip(net.devices[dev].mask)
                        .map(|(a, m)| mask_apply(a, m) == network)
                        .unwrap_or(false)
                })
            } else {
                first_dev[owner as usize]
            };
            if let Some(device) = device {
                routes.push(RouteEntry { network, mask, device });
            }
        }
        net.nodes[node_idx].routes = routes;
    }
}

fn bfs(net: &Network, source: NodeId) -> (Vec<Option<u32>>, Vec<Option<DeviceId>>) {
    let n = net.nodes.len();
    let mut dist: Vec<Option<u32>> = vec![None; n];
    let mut first_dev: Vec<Option<DeviceId>> = vec![None; n];
    let mut queue = VecDeque::new();
    dist[source as usize] = Some(0);
    queue.push_back(source);
    while let Some(cur) = queue.pop_front() {
        for &dev in &net.nodes[cur as usize].devices {
            let peer = net.devices[net.devices[dev].peer].node;
            if dist[peer as usize].is_none() {
                dist[peer as usize] = Some(dist[cur as usize].unwrap() + 1);
                first_dev[peer as usize] = if cur == source {
                    Some(dev)
                } else {
                    first_dev[cur as usize]
                };
                queue.push_back(peer);
            }
        }
    }
    (dist, first_dev)
}
