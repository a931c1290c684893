use minet_core::path_vector::{Neighbor, START_BGP};
use minet_core::{Destination, Internet, Mode, Packet, RouterAddr, RouterConfig, WireFormat};
use std::path::PathBuf;
use std::time::Duration;

/// Runs a path-vector simulation over a line topology.
///
/// `routers` routers stand in a line, each knowing only its direct
/// neighbors. A start signal injected at one end sets off the route
/// exchange. Once every router reports convergence, the first router must
/// hold a full-length path to the last, and a message addressed to the last
/// router must travel the whole line.
pub async fn path_vector_line(routers: usize, quiescence: Duration, tables: Option<PathBuf>) {
    assert!(routers >= 2, "a line needs at least two routers");
    let addrs: Vec<RouterAddr> = (0..routers)
        .map(|i| RouterAddr::localhost(8460 + i as u16))
        .collect();

    let mut internet = Internet::new();
    let mut handles = Vec::new();
    for (i, &addr) in addrs.iter().enumerate() {
        let mut config = RouterConfig::new(addr, Mode::PathVector);
        config.quiescence = quiescence;
        config.table_out = tables.clone();
        if i > 0 {
            config.neighbors.push(Neighbor {
                addr: addrs[i - 1],
                mtu: 1500,
            });
        }
        if i + 1 < routers {
            config.neighbors.push(Neighbor {
                addr: addrs[i + 1],
                mtu: 1500,
            });
        }
        handles.push(internet.add_router(config));
    }

    let mut sender = internet.endpoint(RouterAddr::localhost(8459));
    let start = Packet::new(addrs[0], 1, START_BGP.to_vec());
    sender.send(addrs[0], start.to_wire(WireFormat::Fragmentation));

    let patience = quiescence * 20 + Duration::from_secs(2);
    let mut tables_seen = Vec::new();
    for (i, handle) in handles.iter_mut().enumerate() {
        let entries = tokio::time::timeout(patience, handle.converged.recv())
            .await
            .unwrap_or_else(|_| panic!("router {i} never converged"))
            .expect("converging routers are still running");
        assert_eq!(entries.len(), routers - 1, "router {i} is missing routes");
        tables_seen.push(entries);
    }

    // Adjacent routers route straight to each other.
    for (i, entries) in tables_seen.iter().enumerate() {
        for neighbor in [i.checked_sub(1), (i + 1 < routers).then_some(i + 1)]
            .into_iter()
            .flatten()
        {
            let direct = entries
                .iter()
                .find(|entry| entry.dest == Destination::Router(addrs[neighbor]))
                .unwrap_or_else(|| panic!("router {i} has no route to router {neighbor}"));
            assert_eq!(direct.hop, addrs[neighbor]);
            assert_eq!(
                direct.path.as_ref().map(|p| p.hop_count()),
                Some(1),
                "router {i} should reach router {neighbor} directly"
            );
        }
    }

    // The first router reaches the far end through its only neighbor, over
    // a path crossing every link in the line.
    let far_end = *addrs.last().expect("the line is not empty");
    let to_far_end = tables_seen[0]
        .iter()
        .find(|entry| entry.dest == Destination::Router(far_end))
        .expect("the first router should learn a route to the last");
    assert_eq!(to_far_end.hop, addrs[1]);
    let path = to_far_end
        .path
        .as_ref()
        .expect("discovered routes keep their paths");
    assert_eq!(path.hop_count(), routers - 1);

    let message = b"sent across the discovered routes";
    let packet = Packet::new(far_end, 2, message.to_vec());
    sender.send(addrs[0], packet.to_wire(WireFormat::Fragmentation));
    let last = handles.last_mut().expect("the line is not empty");
    let delivery = tokio::time::timeout(Duration::from_secs(2), last.delivered.recv())
        .await
        .expect("the discovered routes should deliver within two seconds")
        .expect("the last router is still running");
    assert_eq!(delivery.payload, message);

    if let Some(dir) = tables {
        for addr in &addrs {
            let file = dir.join(format!("bgp_{}.txt", addr.port));
            assert!(file.exists(), "router {addr} never wrote its table");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[tokio::test]
    async fn path_vector_line() {
        super::path_vector_line(3, Duration::from_millis(300), None).await
    }

    #[tokio::test]
    async fn path_vector_line_longer() {
        super::path_vector_line(5, Duration::from_millis(300), None).await
    }

    #[tokio::test]
    async fn path_vector_line_persists_tables() {
        let dir = std::env::temp_dir().join(format!("minet_line_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir should create");
        super::path_vector_line(3, Duration::from_millis(300), Some(dir)).await
    }
}
