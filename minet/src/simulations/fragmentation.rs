use minet_core::{
    Destination, Internet, Mode, Packet, RouteEntry, RouterAddr, RouterConfig, WireFormat,
};
use std::time::Duration;

/// Runs a fragmentation simulation.
///
/// A six kilobyte message crosses two links on its way to the destination
/// router: the first with a 1500 byte MTU, the second with a 500 byte MTU.
/// The first router fragments the message, the second fragments each of
/// those pieces again, and the destination reassembles the original before
/// delivering it.
pub async fn fragmentation() {
    let first = RouterAddr::localhost(8440);
    let second = RouterAddr::localhost(8441);
    let dest = RouterAddr::localhost(8442);

    let mut internet = Internet::new();
    for (addr, hop, mtu) in [(first, second, 1500), (second, dest, 500)] {
        let mut config = RouterConfig::new(addr, Mode::Fragmentation);
        config.routes = [RouteEntry {
            dest: Destination::PortRange {
                ip: dest.ip,
                low: dest.port,
                high: dest.port,
            },
            hop,
            mtu,
            path: None,
        }]
        .into_iter()
        .collect();
        internet.add_router(config);
    }
    let mut destination = internet.add_router(RouterConfig::new(dest, Mode::Fragmentation));

    let payload: Vec<u8> = (0..6000).map(|i| (i % 251) as u8).collect();
    let packet = Packet::new(dest, 7, payload.clone());
    let mut sender = internet.endpoint(RouterAddr::localhost(8439));
    sender.send(first, packet.to_wire(WireFormat::Fragmentation));

    let delivery = tokio::time::timeout(Duration::from_secs(2), destination.delivered.recv())
        .await
        .expect("reassembly should finish within two seconds")
        .expect("the destination router is still running");
    assert_eq!(delivery.payload, payload);
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn fragmentation() {
        super::fragmentation().await
    }
}
