use minet_core::{
    table_io, Destination, Internet, Mode, Packet, RouteEntry, RouterAddr, RouterConfig,
    WireFormat,
};
use std::path::Path;
use std::time::Duration;

/// Runs a static forwarding simulation.
///
/// A message is injected at the first of `routers` chained routers and
/// addressed to the last. Every router on the way looks the destination up
/// in its seeded table and passes the message along. The simulation ends
/// when the last router delivers it. With `ttl` on, every hop also spends
/// one unit of the packet's hop budget.
///
/// With a table directory, each router seeds its table from
/// `routes_<port>.txt` in that directory instead; a router with no file
/// starts with an empty table.
pub async fn forwarding(routers: usize, ttl: bool, tables: Option<&Path>) {
    assert!(routers >= 2, "a chain needs at least two routers");
    let addrs: Vec<RouterAddr> = (0..routers)
        .map(|i| RouterAddr::localhost(8400 + i as u16))
        .collect();
    let dest = addrs[routers - 1];
    let format = if ttl {
        WireFormat::Ttl
    } else {
        WireFormat::Plain
    };

    let mut internet = Internet::new();
    let mut handles = Vec::new();
    for (i, &addr) in addrs.iter().enumerate() {
        let mut config = RouterConfig::new(addr, Mode::Forwarding);
        config.ttl_enabled = ttl;
        config.routes = match tables {
            Some(dir) => {
                let file = dir.join(format!("routes_{}.txt", addr.port));
                if file.exists() {
                    table_io::load_forwarding_table(&file)
                        .unwrap_or_else(|e| panic!("bad routing table {}: {e}", file.display()))
                } else {
                    Default::default()
                }
            }
            None if i + 1 < routers => [RouteEntry {
                dest: Destination::PortRange {
                    ip: dest.ip,
                    low: dest.port,
                    high: dest.port,
                },
                hop: addrs[i + 1],
                mtu: 1500,
                path: None,
            }]
            .into_iter()
            .collect(),
            None => Default::default(),
        };
        handles.push(internet.add_router(config));
    }

    let mut sender = internet.endpoint(RouterAddr::localhost(8399));
    let message = b"forwarded along the chain";
    let packet = Packet::new(dest, 1, message.to_vec());
    sender.send(addrs[0], packet.to_wire(format));

    let last = handles.last_mut().expect("the chain is not empty");
    let delivery = tokio::time::timeout(Duration::from_secs(2), last.delivered.recv())
        .await
        .expect("the chain should deliver within two seconds")
        .expect("the last router is still running");
    assert_eq!(delivery.at, dest);
    assert_eq!(delivery.payload, message);
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn forwarding() {
        super::forwarding(3, false, None).await
    }

    #[tokio::test]
    async fn forwarding_with_ttl() {
        super::forwarding(3, true, None).await
    }

    #[tokio::test]
    async fn forwarding_long_chain() {
        super::forwarding(8, false, None).await
    }

    #[tokio::test]
    async fn forwarding_seeded_from_table_files() {
        let dir = std::env::temp_dir().join(format!("minet_seeded_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir should create");
        // The same chain the in-code setup builds, as table files.
        for port in [8400u16, 8401] {
            std::fs::write(
                dir.join(format!("routes_{port}.txt")),
                format!("127.0.0.1 8402 8402 127.0.0.1 {} 1500\n", port + 1),
            )
            .expect("table file should write");
        }
        super::forwarding(3, false, Some(&dir)).await
    }
}
