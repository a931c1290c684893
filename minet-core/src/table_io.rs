//! Reading and writing routing table files.
//!
//! Two row shapes exist. Forwarding rows describe a static table:
//!
//! ```text
//! destIP portLow portHigh hopIP hopPort mtu
//! ```
//!
//! Path rows carry an AS path and appear in the files a converged
//! path-vector router writes, one file per router, named `bgp_<port>.txt`:
//!
//! ```text
//! destIP hop1IP:hop1Port ... selfIP:selfPort hopIP hopPort mtu
//! ```
//!
//! A saved path file round-trips: loading it back yields entries a router
//! can install directly, skipping rediscovery.

use crate::addr::{AddrParseError, RouterAddr};
use crate::path_vector::{AsPath, Neighbor};
use crate::table::{Destination, ForwardingTable, RouteEntry};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum TableFileError {
    #[error("could not read routing table: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {source}")]
    Row { line: usize, source: RowParseError },
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum RowParseError {
    #[error("expected `destIP portLow portHigh hopIP hopPort mtu`")]
    ForwardingFields,
    #[error("expected `destIP AS-path hopIP hopPort mtu`")]
    PathFields,
    #[error("invalid address: {0}")]
    Addr(#[from] AddrParseError),
    #[error("numeric field was invalid")]
    Number,
    #[error("port range is inverted")]
    InvertedRange,
    #[error("mtu must be at least 1")]
    ZeroMtu,
}

/// Loads a static forwarding table, one forwarding row per line. Blank
/// lines are skipped.
pub fn load_forwarding_table(path: &Path) -> Result<ForwardingTable, TableFileError> {
    let text = fs::read_to_string(path)?;
    parse_rows(&text, parse_forwarding_row).map(|rows| rows.into_iter().collect())
}

/// Loads a converged path-vector table, one path row per line.
pub fn load_path_table(path: &Path) -> Result<Vec<RouteEntry>, TableFileError> {
    let text = fs::read_to_string(path)?;
    parse_rows(&text, parse_path_row)
}

fn parse_rows(
    text: &str,
    parse: fn(&str) -> Result<RouteEntry, RowParseError>,
) -> Result<Vec<RouteEntry>, TableFileError> {
    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse(line).map_err(|source| TableFileError::Row {
            line: index + 1,
            source,
        })?);
    }
    Ok(rows)
}

pub fn parse_forwarding_row(line: &str) -> Result<RouteEntry, RowParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [dest_ip, low, high, hop_ip, hop_port, mtu] = fields[..] else {
        return Err(RowParseError::ForwardingFields);
    };
    let low: u16 = low.parse().map_err(|_| RowParseError::Number)?;
    let high: u16 = high.parse().map_err(|_| RowParseError::Number)?;
    if low > high {
        return Err(RowParseError::InvertedRange);
    }
    Ok(RouteEntry {
        dest: Destination::PortRange {
            ip: dest_ip.parse()?,
            low,
            high,
        },
        hop: RouterAddr {
            ip: hop_ip.parse()?,
            port: hop_port.parse().map_err(|_| RowParseError::Number)?,
        },
        mtu: parse_mtu(mtu)?,
        path: None,
    })
}

pub fn parse_path_row(line: &str) -> Result<RouteEntry, RowParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(RowParseError::PathFields);
    }
    let (head, tail) = fields.split_at(fields.len() - 3);
    let [_dest_ip, path @ ..] = head else {
        return Err(RowParseError::PathFields);
    };
    let [hop_ip, hop_port, mtu] = *tail else {
        return Err(RowParseError::PathFields);
    };
    let hops = path
        .iter()
        .map(|token| token.parse())
        .collect::<Result<Vec<RouterAddr>, _>>()?;
    let path = AsPath::new(hops);
    let Some(dest) = path.dest() else {
        return Err(RowParseError::PathFields);
    };
    Ok(RouteEntry {
        dest: Destination::Router(dest),
        hop: RouterAddr {
            ip: hop_ip.parse()?,
            port: hop_port.parse().map_err(|_| RowParseError::Number)?,
        },
        mtu: parse_mtu(mtu)?,
        path: Some(path),
    })
}

fn parse_mtu(field: &str) -> Result<usize, RowParseError> {
    match field.parse().map_err(|_| RowParseError::Number)? {
        0 => Err(RowParseError::ZeroMtu),
        mtu => Ok(mtu),
    }
}

/// The direct neighbors implied by a seed table: one per distinct next hop,
/// with that link's MTU.
pub fn neighbors_from_routes(routes: &[RouteEntry]) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = Vec::new();
    for route in routes {
        if !neighbors.iter().any(|n| n.addr == route.hop) {
            neighbors.push(Neighbor {
                addr: route.hop,
                mtu: route.mtu,
            });
        }
    }
    neighbors
}

/// Writes a converged routing table to `<dir>/bgp_<port>.txt` and returns
/// the path written. Entries without a stored AS path are skipped.
pub fn save_path_table(
    dir: &Path,
    local: RouterAddr,
    entries: &[RouteEntry],
) -> io::Result<PathBuf> {
    let mut contents = String::new();
    for entry in entries {
        let Some(path) = &entry.path else { continue };
        let Destination::Router(dest) = entry.dest else {
            continue;
        };
        contents.push_str(&format!(
            "{} {} {} {} {}\n",
            dest.ip, path, entry.hop.ip, entry.hop.port, entry.mtu,
        ));
    }
    let file = dir.join(format!("bgp_{}.txt", local.port));
    fs::write(&file, contents)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Ipv4Address;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("minet_tables_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir should create");
        dir
    }

    fn addr(last: u8, port: u16) -> RouterAddr {
        RouterAddr {
            ip: [127, 0, 0, last].into(),
            port,
        }
    }

    #[test]
    fn parses_a_forwarding_row() {
        let entry = parse_forwarding_row("127.0.0.1 8000 8004 127.0.0.1 8005 1500")
            .expect("row should parse");
        assert_eq!(
            entry.dest,
            Destination::PortRange {
                ip: Ipv4Address::LOCALHOST,
                low: 8000,
                high: 8004,
            }
        );
        assert_eq!(entry.hop, addr(1, 8005));
        assert_eq!(entry.mtu, 1500);
        assert!(entry.path.is_none());
    }

    #[test]
    fn rejects_bad_forwarding_rows() {
        for (row, expected) in [
            ("127.0.0.1 8000 8004 127.0.0.1 8005", RowParseError::ForwardingFields),
            (
                "127.0.0.1 9000 8000 127.0.0.1 8005 1500",
                RowParseError::InvertedRange,
            ),
            ("127.0.0.1 8000 8004 127.0.0.1 8005 0", RowParseError::ZeroMtu),
            (
                "127.0.0.1 8000 8004 127.0.0.1 8005 pigeon",
                RowParseError::Number,
            ),
        ] {
            assert_eq!(parse_forwarding_row(row), Err(expected), "row: {row}");
        }
    }

    #[test]
    fn parses_a_path_row() {
        let entry = parse_path_row("127.0.0.1 127.0.0.1:8000 127.0.0.1:8001 127.0.0.1:8002 127.0.0.1 8001 1500")
            .expect("row should parse");
        assert_eq!(entry.dest, Destination::Router(addr(1, 8000)));
        assert_eq!(entry.hop, addr(1, 8001));
        let path = entry.path.expect("path row should keep its path");
        assert_eq!(path.hops().len(), 3);
        assert_eq!(path.next_toward_dest(), Some(addr(1, 8001)));
    }

    #[test]
    fn reports_the_failing_line() {
        let dir = scratch_dir("bad_rows");
        let file = dir.join("table.txt");
        std::fs::write(
            &file,
            "127.0.0.1 8000 8004 127.0.0.1 8005 1500\nnot a row\n",
        )
        .expect("scratch file should write");
        let err = load_forwarding_table(&file).expect_err("second line is malformed");
        assert!(matches!(err, TableFileError::Row { line: 2, .. }));
    }

    #[test]
    fn saved_tables_round_trip() {
        let local = addr(1, 8002);
        let entries = vec![RouteEntry {
            dest: Destination::Router(addr(1, 8000)),
            hop: addr(1, 8001),
            mtu: 1500,
            path: Some(AsPath::new(vec![addr(1, 8000), addr(1, 8001), local])),
        }];
        let dir = scratch_dir("round_trip");
        let file = save_path_table(&dir, local, &entries).expect("table should save");
        assert_eq!(file.file_name().and_then(|n| n.to_str()), Some("bgp_8002.txt"));
        let reloaded = load_path_table(&file).expect("saved table should load");
        assert_eq!(reloaded, entries);
    }

    #[test]
    fn derives_neighbors_without_duplicates() {
        let entries = [
            RouteEntry {
                dest: Destination::Router(addr(1, 8000)),
                hop: addr(1, 8001),
                mtu: 1500,
                path: None,
            },
            RouteEntry {
                dest: Destination::Router(addr(1, 8003)),
                hop: addr(1, 8001),
                mtu: 1500,
                path: None,
            },
            RouteEntry {
                dest: Destination::Router(addr(1, 8004)),
                hop: addr(1, 8004),
                mtu: 500,
                path: None,
            },
        ];
        let neighbors = neighbors_from_routes(&entries);
        assert_eq!(
            neighbors,
            vec![
                Neighbor {
                    addr: addr(1, 8001),
                    mtu: 1500,
                },
                Neighbor {
                    addr: addr(1, 8004),
                    mtu: 500,
                },
            ]
        );
    }
}
