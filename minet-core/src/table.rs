//! The forwarding table, owned and mutated exclusively by one router.

use crate::addr::{Ipv4Address, RouterAddr};
use crate::path_vector::AsPath;

/// What a route matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Forwarding mode: a destination network identified by its address and
    /// an inclusive port range.
    PortRange {
        ip: Ipv4Address,
        low: u16,
        high: u16,
    },
    /// Path-vector mode: one destination AS, matched exactly.
    Router(RouterAddr),
}

impl Destination {
    fn matches(&self, addr: RouterAddr) -> bool {
        match *self {
            Destination::PortRange { ip, low, high } => {
                ip == addr.ip && (low..=high).contains(&addr.port)
            }
            Destination::Router(router) => router == addr,
        }
    }
}

/// One row of the forwarding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub dest: Destination,
    pub hop: RouterAddr,
    /// MTU of the physical link toward `hop`.
    pub mtu: usize,
    /// The AS path that produced this route, present in path-vector mode.
    pub path: Option<AsPath>,
}

/// Routes sharing one destination criterion, visited round-robin. The cursor
/// lives here rather than in any module-wide state so that each router's
/// rotation is independent.
#[derive(Debug, Clone)]
struct RouteGroup {
    dest: Destination,
    entries: Vec<RouteEntry>,
    cursor: usize,
}

/// Maps destination-match criteria to next hops.
///
/// Forwarding-mode lookups rotate through the qualifying routes for one
/// destination group across successive calls. Path-vector groups hold at most
/// one route, the current best.
#[derive(Debug, Clone, Default)]
pub struct ForwardingTable {
    groups: Vec<RouteGroup>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the next hop and link MTU for a destination. Advances the
    /// matched group's round-robin cursor.
    pub fn lookup(&mut self, dest: RouterAddr) -> Option<(RouterAddr, usize)> {
        let group = self.groups.iter_mut().find(|g| g.dest.matches(dest))?;
        let entry = &group.entries[group.cursor % group.entries.len()];
        let found = (entry.hop, entry.mtu);
        group.cursor = (group.cursor + 1) % group.entries.len();
        Some(found)
    }

    /// Adds a route. A no-op when an identical entry is already present.
    pub fn insert(&mut self, route: RouteEntry) {
        match self.groups.iter_mut().find(|g| g.dest == route.dest) {
            Some(group) => {
                if !group.entries.contains(&route) {
                    group.entries.push(route);
                }
            }
            None => self.groups.push(RouteGroup {
                dest: route.dest,
                entries: vec![route],
                cursor: 0,
            }),
        }
    }

    /// Replaces the stored route for a destination, but only when the new
    /// route's AS path is strictly shorter than the incumbent's. Ties keep
    /// the incumbent; equal-length alternates are not retained. Returns
    /// whether the table changed.
    pub fn update(&mut self, route: RouteEntry) -> bool {
        let group = match self.groups.iter_mut().find(|g| g.dest == route.dest) {
            Some(group) => group,
            None => {
                self.insert(route);
                return true;
            }
        };
        let incumbent = &group.entries[0];
        let improves = match (&route.path, &incumbent.path) {
            (Some(new), Some(old)) => new.hop_count() < old.hop_count(),
            _ => false,
        };
        if improves {
            group.entries = vec![route];
            group.cursor = 0;
        }
        improves
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.groups.iter().flat_map(|g| g.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<RouteEntry> for ForwardingTable {
    fn from_iter<T: IntoIterator<Item = RouteEntry>>(iter: T) -> Self {
        let mut table = Self::new();
        for route in iter {
            table.insert(route);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_route(low: u16, high: u16, hop_port: u16) -> RouteEntry {
        RouteEntry {
            dest: Destination::PortRange {
                ip: Ipv4Address::LOCALHOST,
                low,
                high,
            },
            hop: RouterAddr::localhost(hop_port),
            mtu: 1500,
            path: None,
        }
    }

    fn as_route(dest_port: u16, hop_port: u16, path_ports: &[u16]) -> RouteEntry {
        RouteEntry {
            dest: Destination::Router(RouterAddr::localhost(dest_port)),
            hop: RouterAddr::localhost(hop_port),
            mtu: 1500,
            path: Some(AsPath::new(
                path_ports.iter().map(|&p| RouterAddr::localhost(p)).collect(),
            )),
        }
    }

    #[test]
    fn round_robin_visits_every_hop_once() {
        let mut table = ForwardingTable::new();
        for hop in [9001, 9002, 9003] {
            table.insert(range_route(8000, 8099, hop));
        }

        let dest = RouterAddr::localhost(8050);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(table.lookup(dest).unwrap().0.port);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![9001, 9002, 9003]);

        // The cycle repeats in the same order.
        assert_eq!(table.lookup(dest).unwrap().0.port, 9001);
    }

    #[test]
    fn port_outside_range_has_no_route() {
        let mut table = ForwardingTable::new();
        table.insert(range_route(8000, 8099, 9001));
        assert_eq!(table.lookup(RouterAddr::localhost(8100)), None);
    }

    #[test]
    fn insert_identical_is_a_no_op() {
        let mut table = ForwardingTable::new();
        table.insert(range_route(8000, 8099, 9001));
        table.insert(range_route(8000, 8099, 9001));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn update_requires_strict_improvement() {
        let mut table = ForwardingTable::new();
        assert!(table.update(as_route(8883, 8882, &[8883, 8882, 8881])));

        // Same length through a different hop keeps the incumbent.
        assert!(!table.update(as_route(8883, 8884, &[8883, 8884, 8881])));
        let dest = RouterAddr::localhost(8883);
        assert_eq!(table.lookup(dest).unwrap().0.port, 8882);

        // A strictly shorter path replaces it.
        assert!(table.update(as_route(8883, 8883, &[8883, 8881])));
        assert_eq!(table.lookup(dest).unwrap().0.port, 8883);
        assert_eq!(table.len(), 1);
    }
}
