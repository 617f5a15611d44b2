use netlab_core::time::{millis, secs};
use netlab_core::P2pLinkConfig;

use crate::common::Chain;

fn lab_link() -> P2pLinkConfig {
    P2pLinkConfig {
        delay_ns: millis(2.0),
        data_rate_bps: 5_000_000,
        ..P2pLinkConfig::default()
    }
}

// 1054-byte frame (1024B payload + UDP/IPv4/PPP headers) at 5 Mbps
const SER_NS: u64 = 1_686_400;
const PROP_NS: u64 = 2_000_000;

#[test]
fn one_way_delay_is_serialization_plus_propagation() {
    let mut h = Chain::new(2, lab_link());
    let dst = h.addrs[0][1];
    h.add_server(1, 8000, 0.5, 5.0);
    h.add_client(0, dst, 8000, 1, 1.0, 1024, 1.0, 5.0);
    h.run();

    let flow = h.flow(1);
    assert_eq!(flow.tx_packets, 1);
    assert_eq!(flow.rx_packets, 1);
    assert_eq!(flow.time_first_tx, secs(1.0));
    assert_eq!(flow.delay_sum_ns, SER_NS + PROP_NS);
    assert_eq!(flow.time_first_rx, secs(1.0) + SER_NS + PROP_NS);
}

#[test]
fn back_to_back_packets_serialize_sequentially() {
    let mut h = Chain::new(2, lab_link());
    let dst = h.addrs[0][1];
    h.add_server(1, 8000, 0.5, 5.0);
    // interval 0: all three datagrams handed to the device at t=1s
    h.add_client(0, dst, 8000, 3, 0.0, 1024, 1.0, 5.0);
    h.run();

    let flow = h.flow(1);
    assert_eq!(flow.rx_packets, 3);
    assert_eq!(flow.time_last_rx - flow.time_first_rx, 2 * SER_NS);
    // queueing delay shows up as inter-packet jitter
    assert_eq!(flow.jitter_sum_ns, 2 * SER_NS);
}

#[test]
fn drop_tail_queue_overflows() {
    let cfg = P2pLinkConfig {
        queue_cap: 2,
        ..lab_link()
    };
    let mut h = Chain::new(2, cfg);
    let dst = h.addrs[0][1];
    h.add_server(1, 8000, 0.5, 5.0);
    h.add_client(0, dst, 8000, 5, 0.0, 1024, 1.0, 5.0);
    h.run();

    // one in flight + two queued; the last two overflow
    let src_dev = h.sim.network.links[h.links[0]].devices[0];
    assert_eq!(h.sim.network.device(src_dev).drops, 2);
    let flow = h.flow(1);
    assert_eq!(flow.tx_packets, 5);
    assert_eq!(flow.rx_packets, 3);
    assert_eq!(flow.lost_packets(), 2);
}

#[test]
fn oversize_packet_is_dropped_without_fragmentation() {
    let cfg = P2pLinkConfig {
        mtu: 1400,
        ..lab_link()
    };
    let mut h = Chain::new(2, cfg);
    let dst = h.addrs[0][1];
    h.add_server(1, 8000, 0.5, 5.0);
    // 2000B payload -> 2028B IPv4 packet, over the 1400B MTU
    h.add_client(0, dst, 8000, 1, 1.0, 2000, 1.0, 5.0);
    h.run();

    let flow = h.flow(1);
    assert_eq!(flow.tx_packets, 1);
    assert_eq!(flow.rx_packets, 0);
    let src_dev = h.sim.network.links[h.links[0]].devices[0];
    assert_eq!(h.sim.network.device(src_dev).drops, 1);
}

#[test]
fn zero_rate_link_stalls_without_delivering() {
    let cfg = P2pLinkConfig {
        data_rate_bps: 0,
        ..lab_link()
    };
    let mut h = Chain::new(2, cfg);
    let dst = h.addrs[0][1];
    h.add_server(1, 8000, 0.5, 5.0);
    h.add_client(0, dst, 8000, 1, 1.0, 1024, 1.0, 5.0);
    // serialization never completes; the stop time bounds the run
    h.sim.stop_at(secs(6.0));
    h.run();

    let flow = h.flow(1);
    assert_eq!(flow.tx_packets, 1);
    assert_eq!(flow.rx_packets, 0);
}

#[test]
fn jitter_stays_within_configured_amplitude() {
    let cfg = P2pLinkConfig {
        jitter_ns: 500_000,
        ..lab_link()
    };
    let mut h = Chain::new(2, cfg);
    let dst = h.addrs[0][1];
    h.add_server(1, 8000, 0.5, 5.0);
    h.add_client(0, dst, 8000, 20, 0.01, 1024, 1.0, 5.0);
    h.run();

    let flow = h.flow(1);
    assert_eq!(flow.rx_packets, 20);
    let mean = flow.delay_sum_ns as f64 / flow.rx_packets as f64;
    assert!(mean >= (SER_NS + PROP_NS) as f64);
    assert!(mean <= (SER_NS + PROP_NS + 500_000) as f64);
}
