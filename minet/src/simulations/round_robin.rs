use minet_core::{
    Destination, Internet, Mode, Packet, RouteEntry, RouterAddr, RouterConfig, WireFormat,
};
use std::time::Duration;

/// Runs a round-robin forwarding simulation.
///
/// One router holds three routes for the same destination port range, each
/// through a different replica. Six messages addressed to that range leave
/// through the replicas in rotation, so each replica sees exactly two.
pub async fn round_robin() {
    let router = RouterAddr::localhost(8420);
    let replicas = [
        RouterAddr::localhost(8421),
        RouterAddr::localhost(8422),
        RouterAddr::localhost(8423),
    ];
    let service = RouterAddr::localhost(9420);

    let mut internet = Internet::new();
    let mut config = RouterConfig::new(router, Mode::Forwarding);
    config.routes = replicas
        .iter()
        .map(|&hop| RouteEntry {
            dest: Destination::PortRange {
                ip: service.ip,
                low: service.port,
                high: service.port,
            },
            hop,
            mtu: 1500,
            path: None,
        })
        .collect();
    internet.add_router(config);

    let mut receiving: Vec<_> = replicas
        .iter()
        .map(|&replica| internet.endpoint(replica))
        .collect();
    let mut sender = internet.endpoint(RouterAddr::localhost(8419));
    for id in 0..6u16 {
        let packet = Packet::new(service, id, format!("message {id}").into_bytes());
        sender.send(router, packet.to_wire(WireFormat::Plain));
    }

    // The rotation hands messages out replica by replica, so each endpoint
    // gets its two in order.
    for (i, endpoint) in receiving.iter_mut().enumerate() {
        for round in 0..2 {
            let (_, bytes) = tokio::time::timeout(Duration::from_secs(1), endpoint.recv())
                .await
                .unwrap_or_else(|_| panic!("replica {i} never got its share"));
            let packet = Packet::from_wire(&bytes, WireFormat::Plain)
                .expect("forwarded messages stay well formed");
            let expected = format!("message {}", round * 3 + i);
            assert_eq!(packet.payload, expected.as_bytes());
        }
    }
}
