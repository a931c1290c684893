use minet_core::path_vector::{Neighbor, START_BGP};
use minet_core::{table_io, Internet, Mode, Packet, RouterAddr, RouterConfig, WireFormat};
use std::path::Path;
use std::time::Duration;

/// Runs a path-vector discovery once, then reloads the persisted tables.
///
/// Three routers in a line converge and write their tables to `dir`. A
/// second, fresh simulation then seeds every router from its saved
/// `bgp_<port>.txt` file, with its neighbor links recovered from the same
/// rows, and never exchanges a single advertisement. A message still
/// crosses the whole line, riding entirely on the reloaded routes.
pub async fn path_vector_reload(quiescence: Duration, dir: &Path) {
    std::fs::create_dir_all(dir).expect("table dir should create");
    let addrs = [
        RouterAddr::localhost(8500),
        RouterAddr::localhost(8501),
        RouterAddr::localhost(8502),
    ];

    // First run: discover and persist.
    {
        let mut internet = Internet::new();
        let mut handles = Vec::new();
        for (i, &addr) in addrs.iter().enumerate() {
            let mut config = RouterConfig::new(addr, Mode::PathVector);
            config.quiescence = quiescence;
            config.table_out = Some(dir.to_path_buf());
            if i > 0 {
                config.neighbors.push(Neighbor {
                    addr: addrs[i - 1],
                    mtu: 1500,
                });
            }
            if i + 1 < addrs.len() {
                config.neighbors.push(Neighbor {
                    addr: addrs[i + 1],
                    mtu: 1500,
                });
            }
            handles.push(internet.add_router(config));
        }
        let mut sender = internet.endpoint(RouterAddr::localhost(8499));
        let start = Packet::new(addrs[0], 1, START_BGP.to_vec());
        sender.send(addrs[0], start.to_wire(WireFormat::Fragmentation));

        let patience = quiescence * 20 + Duration::from_secs(2);
        for (i, handle) in handles.iter_mut().enumerate() {
            tokio::time::timeout(patience, handle.converged.recv())
                .await
                .unwrap_or_else(|_| panic!("router {i} never converged"))
                .expect("converging routers are still running");
        }
    }

    // Second run: no start signal, no advertisements, routes from disk.
    let mut internet = Internet::new();
    let mut handles = Vec::new();
    for &addr in &addrs {
        let file = dir.join(format!("bgp_{}.txt", addr.port));
        let entries = table_io::load_path_table(&file)
            .unwrap_or_else(|e| panic!("bad saved table {}: {e}", file.display()));
        let mut config = RouterConfig::new(addr, Mode::PathVector);
        config.quiescence = quiescence;
        config.neighbors = table_io::neighbors_from_routes(&entries);
        config.routes = entries.into_iter().collect();
        handles.push(internet.add_router(config));
    }

    let mut sender = internet.endpoint(RouterAddr::localhost(8499));
    let message = b"carried on reloaded routes";
    let packet = Packet::new(addrs[2], 2, message.to_vec());
    sender.send(addrs[0], packet.to_wire(WireFormat::Fragmentation));

    let last = handles.last_mut().expect("the line is not empty");
    let delivery = tokio::time::timeout(Duration::from_secs(2), last.delivered.recv())
        .await
        .expect("the reloaded routes should deliver within two seconds")
        .expect("the last router is still running");
    assert_eq!(delivery.payload, message);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[tokio::test]
    async fn path_vector_reload() {
        let dir = std::env::temp_dir().join(format!("minet_reload_{}", std::process::id()));
        super::path_vector_reload(Duration::from_millis(300), &dir).await
    }
}
