use std::net::Ipv4Addr;

use netlab_core::time::{millis, secs};
use netlab_core::P2pLinkConfig;

use crate::common::{CaptureSink, Chain};

fn lab_link() -> P2pLinkConfig {
    P2pLinkConfig {
        delay_ns: millis(2.0),
        data_rate_bps: 5_000_000,
        ..P2pLinkConfig::default()
    }
}

const SER_NS: u64 = 1_686_400;
const PROP_NS: u64 = 2_000_000;

#[test]
fn forwards_across_intermediate_node() {
    let mut h = Chain::new(3, lab_link());
    let dst = h.addrs[1][1]; // node 2 on the second link
    let server = h.add_server(2, 8000, 0.5, 5.0);
    h.add_client(0, dst, 8000, 1, 1.0, 1024, 1.0, 5.0);
    h.run();

    assert_eq!(h.server(server).received, 1);
    // two store-and-forward hops
    let flow = h.flow(1);
    assert_eq!(flow.delay_sum_ns, 2 * (SER_NS + PROP_NS));
    // source address comes from node 0's device on the first link
    assert_eq!(
        h.sim.flowmon.as_ref().unwrap().flows().next().unwrap().1.src,
        h.addrs[0][0]
    );
}

#[test]
fn forwarding_decrements_ttl() {
    let mut h = Chain::new(3, lab_link());
    let dst = h.addrs[1][1];
    let sink = h.sim.install_app(
        h.nodes[2],
        Box::new(CaptureSink::new(9000)),
        secs(0.5),
        secs(5.0),
    );
    h.add_client(0, dst, 9000, 1, 1.0, 256, 1.0, 5.0);
    h.run();

    let captured = &h.sim.app::<CaptureSink>(sink).unwrap().packets;
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].ipv4.ttl, 63); // one forwarding hop off the default 64
    assert_eq!(captured[0].ipv4.dst, dst);
}

#[test]
fn directly_connected_subnet_skips_forwarding() {
    let mut h = Chain::new(3, lab_link());
    let dst = h.addrs[0][1]; // node 1 on the shared first link
    let server = h.add_server(1, 8000, 0.5, 5.0);
    h.add_client(0, dst, 8000, 1, 1.0, 1024, 1.0, 5.0);
    h.run();

    assert_eq!(h.server(server).received, 1);
    assert_eq!(h.flow(1).delay_sum_ns, SER_NS + PROP_NS);
}

#[test]
fn unroutable_destination_is_dropped_quietly() {
    let mut h = Chain::new(2, lab_link());
    h.add_server(1, 8000, 0.5, 5.0);
    h.add_client(0, Ipv4Addr::new(10, 9, 9, 9), 8000, 3, 0.1, 1024, 1.0, 5.0);
    h.run();

    // nothing ever reached the stack's first hop
    assert!(h.sim.flowmon.as_ref().unwrap().is_empty());
}

#[test]
fn every_node_learns_every_prefix() {
    let h = Chain::new(3, lab_link());
    for pos in 0..3 {
        for link_addrs in &h.addrs {
            for addr in link_addrs {
                assert!(
                    h.sim.network.route(h.nodes[pos], *addr).is_some(),
                    "node {pos} has no route to {addr}"
                );
            }
        }
    }
}
