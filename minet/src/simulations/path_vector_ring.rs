use minet_core::path_vector::{Neighbor, START_BGP};
use minet_core::{Destination, Internet, Mode, Packet, RouterAddr, RouterConfig, WireFormat};
use std::time::Duration;

/// Runs a path-vector simulation over a ring topology.
///
/// A ring offers two directions to every destination, so advertisements
/// circulate both ways and each router must refuse paths that already pass
/// through it. After convergence every router holds one route per other
/// router, and each route to a direct neighbor goes straight there instead
/// of the long way around.
pub async fn path_vector_ring(routers: usize, quiescence: Duration) {
    assert!(routers >= 3, "a ring needs at least three routers");
    let addrs: Vec<RouterAddr> = (0..routers)
        .map(|i| RouterAddr::localhost(8480 + i as u16))
        .collect();

    let mut internet = Internet::new();
    let mut handles = Vec::new();
    for (i, &addr) in addrs.iter().enumerate() {
        let mut config = RouterConfig::new(addr, Mode::PathVector);
        config.quiescence = quiescence;
        config.neighbors = vec![
            Neighbor {
                addr: addrs[(i + routers - 1) % routers],
                mtu: 1500,
            },
            Neighbor {
                addr: addrs[(i + 1) % routers],
                mtu: 1500,
            },
        ];
        handles.push(internet.add_router(config));
    }

    let mut sender = internet.endpoint(RouterAddr::localhost(8479));
    let start = Packet::new(addrs[0], 1, START_BGP.to_vec());
    sender.send(addrs[0], start.to_wire(WireFormat::Fragmentation));

    let patience = quiescence * 20 + Duration::from_secs(2);
    for (i, handle) in handles.iter_mut().enumerate() {
        let entries = tokio::time::timeout(patience, handle.converged.recv())
            .await
            .unwrap_or_else(|_| panic!("router {i} never converged"))
            .expect("converging routers are still running");
        assert_eq!(entries.len(), routers - 1, "router {i} is missing routes");
        for (j, &other) in addrs.iter().enumerate() {
            if j == i {
                continue;
            }
            let entry = entries
                .iter()
                .find(|entry| entry.dest == Destination::Router(other))
                .unwrap_or_else(|| panic!("router {i} has no route to router {j}"));
            let path = entry
                .path
                .as_ref()
                .expect("discovered routes keep their paths");
            // The shorter way around the ring, never a path revisiting the
            // owner.
            let around = j.abs_diff(i).min(routers - j.abs_diff(i));
            assert_eq!(
                path.hop_count(),
                around,
                "router {i} took the long way to router {j}"
            );
        }
    }
}
