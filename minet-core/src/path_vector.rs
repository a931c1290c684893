//! The path-vector route advertisement protocol, a pared-down BGP.
//!
//! Each router is one AS. Routers exchange batches of AS paths with their
//! direct neighbors; a path already containing the receiving router is
//! discarded, which is the only loop protection the protocol has or needs.
//! Convergence is detected by quiescence: a fixed window with no new routing
//! information stands in for the global barrier no router can observe.

use crate::addr::{AddrParseError, RouterAddr};
use crate::table::{Destination, RouteEntry};
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Payload of the control packet that kicks off route exchange.
pub const START_BGP: &[u8] = b"START_BGP";

const BATCH_HEADER: &str = "BGP_ROUTES";
const BATCH_TRAILER: &str = "END_BGP_ROUTES";

/// An ordered list of AS identifiers, most distant first. Stored paths end
/// with the router that stored them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsPath(Vec<RouterAddr>);

impl AsPath {
    pub fn new(hops: Vec<RouterAddr>) -> Self {
        Self(hops)
    }

    pub fn hops(&self) -> &[RouterAddr] {
        &self.0
    }

    /// The number of links the path crosses.
    pub fn hop_count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// The destination AS this path leads to.
    pub fn dest(&self) -> Option<RouterAddr> {
        self.0.first().copied()
    }

    pub fn contains(&self, addr: RouterAddr) -> bool {
        self.0.contains(&addr)
    }

    /// This path as seen one hop further away, from `addr`.
    pub fn extended(&self, addr: RouterAddr) -> Self {
        let mut hops = self.0.clone();
        hops.push(addr);
        Self(hops)
    }

    /// The directly connected AS an owner of this path forwards through:
    /// the hop just before the owner itself.
    pub fn next_toward_dest(&self) -> Option<RouterAddr> {
        match self.0.len() {
            0 | 1 => None,
            len => Some(self.0[len - 2]),
        }
    }
}

impl Display for AsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{hop}")?;
        }
        Ok(())
    }
}

impl FromStr for AsPath {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// A directly connected router and the MTU of the physical link to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub addr: RouterAddr,
    pub mtu: usize,
}

/// One advertisement batch: the sending AS plus every path it knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub sender: RouterAddr,
    pub paths: Vec<AsPath>,
}

impl Advertisement {
    /// Whether a data payload is an advertisement batch.
    pub fn is_batch(payload: &[u8]) -> bool {
        payload.starts_with(BATCH_HEADER.as_bytes())
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = format!("{BATCH_HEADER}\n{}\n", self.sender);
        for path in &self.paths {
            out.push_str(&path.to_string());
            out.push('\n');
        }
        out.push_str(BATCH_TRAILER);
        out.into_bytes()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, BatchParseError> {
        let text = std::str::from_utf8(payload).map_err(|_| BatchParseError::NotText)?;
        let mut lines = text.lines();
        if lines.next() != Some(BATCH_HEADER) {
            return Err(BatchParseError::Header);
        }
        let sender = lines
            .next()
            .ok_or(BatchParseError::MissingSender)?
            .parse()
            .map_err(BatchParseError::Addr)?;
        let mut paths = Vec::new();
        loop {
            match lines.next() {
                Some(BATCH_TRAILER) => break,
                Some(line) => paths.push(line.parse().map_err(BatchParseError::Addr)?),
                None => return Err(BatchParseError::Trailer),
            }
        }
        Ok(Self { sender, paths })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum BatchParseError {
    #[error("batch is not valid utf-8")]
    NotText,
    #[error("batch does not begin with the BGP_ROUTES header")]
    Header,
    #[error("batch names no sending AS")]
    MissingSender,
    #[error("batch is missing the END_BGP_ROUTES trailer")]
    Trailer,
    #[error("invalid AS identifier: {0}")]
    Addr(AddrParseError),
}

/// Where one convergence run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgpState {
    /// Waiting for a start signal; knows only its direct neighbors.
    Idle,
    /// Exchanging batches; re-advertises whenever its paths improve.
    Listening,
    /// The quiescence window elapsed with nothing new. Terminal.
    Converged,
}

/// Per-router path-vector session state. Owned and mutated exclusively by its
/// router; no state is shared between routers.
#[derive(Debug)]
pub struct PathVector {
    local: RouterAddr,
    neighbors: Vec<Neighbor>,
    /// Best known path per destination AS. Only ever replaced by a strictly
    /// shorter path for the lifetime of one convergence run.
    known_paths: HashMap<RouterAddr, AsPath>,
    pending_change: bool,
    state: BgpState,
}

impl PathVector {
    /// Seeds the session with one trivial one-hop path per direct neighbor.
    pub fn new(local: RouterAddr, neighbors: Vec<Neighbor>) -> Self {
        let known_paths = neighbors
            .iter()
            .map(|n| (n.addr, AsPath::new(vec![n.addr, local])))
            .collect();
        Self {
            local,
            neighbors,
            known_paths,
            pending_change: false,
            state: BgpState::Idle,
        }
    }

    pub fn state(&self) -> BgpState {
        self.state
    }

    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// Moves from IDLE to LISTENING on the first start signal or batch.
    /// Returns whether the transition happened now, in which case the caller
    /// broadcasts the current paths and arms the quiescence timer.
    pub fn start_listening(&mut self) -> bool {
        if self.state == BgpState::Idle {
            self.state = BgpState::Listening;
            true
        } else {
            false
        }
    }

    /// The batch to broadcast to every neighbor.
    pub fn advertisement(&self) -> Advertisement {
        let mut paths: Vec<AsPath> = self.known_paths.values().cloned().collect();
        paths.sort_by_key(|p| p.dest());
        Advertisement {
            sender: self.local,
            paths,
        }
    }

    /// Applies one incoming batch. Returns whether anything was learned, in
    /// which case the caller re-broadcasts and resets the quiescence timer.
    pub fn process_batch(&mut self, batch: &Advertisement) -> bool {
        let mut modified = false;
        for path in &batch.paths {
            let dest = match path.dest() {
                Some(dest) => dest,
                None => continue,
            };
            if dest == self.local {
                continue;
            }
            if path.contains(self.local) {
                tracing::debug!(
                    "discarding looping path {} advertised by {}",
                    path,
                    batch.sender,
                );
                continue;
            }
            let candidate = path.extended(self.local);
            match self.known_paths.get(&dest) {
                None => {
                    self.known_paths.insert(dest, candidate);
                    modified = true;
                }
                Some(stored) if candidate.hop_count() < stored.hop_count() => {
                    self.known_paths.insert(dest, candidate);
                    modified = true;
                }
                Some(_) => {}
            }
        }
        self.pending_change |= modified;
        modified
    }

    /// Reads and clears the pending-change flag.
    pub fn take_pending_change(&mut self) -> bool {
        std::mem::take(&mut self.pending_change)
    }

    /// Ends the run: translates the known paths into forwarding routes. No
    /// further advertisements are sent after this.
    pub fn converge(&mut self) -> Vec<RouteEntry> {
        self.state = BgpState::Converged;
        let mut entries: Vec<RouteEntry> = Vec::with_capacity(self.known_paths.len());
        for (dest, path) in &self.known_paths {
            let toward = match path.next_toward_dest() {
                Some(toward) => toward,
                None => continue,
            };
            let link = match self.neighbors.iter().find(|n| n.addr == toward) {
                Some(link) => link,
                None => {
                    tracing::warn!("path to {} goes through unknown neighbor {}", dest, toward);
                    continue;
                }
            };
            entries.push(RouteEntry {
                dest: Destination::Router(*dest),
                hop: link.addr,
                mtu: link.mtu,
                path: Some(path.clone()),
            });
        }
        entries.sort_by_key(|e| match e.dest {
            Destination::Router(addr) => addr,
            Destination::PortRange { .. } => unreachable!("converge emits router routes"),
        });
        entries
    }
}
