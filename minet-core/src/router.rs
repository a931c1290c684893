//! The router: one independently running unit of the simulated internet.
//!
//! A router owns its forwarding table, reassembly buffers, and path-vector
//! session outright; routers interact only by datagram. Within the router the
//! receive-process-send loop is single-threaded: one inbound datagram or
//! timer event is handled to completion, including any sends it causes,
//! before the next is looked at, so none of the owned state needs locking.

use crate::addr::RouterAddr;
use crate::fragment::{BufId, Epoch, Reassembly};
use crate::packet::{Packet, WireFormat};
use crate::path_vector::{Advertisement, BgpState, Neighbor, PathVector, START_BGP};
use crate::processor::{Outcome, PacketProcessor};
use crate::shutdown::Shutdown;
use crate::table::{ForwardingTable, RouteEntry};
use crate::table_io;
use crate::transport::Transport;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What a simulation does with its routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Forward by destination and port range; no TTL header, no fragments.
    Forwarding,
    /// Forward with TTL tracking and per-link fragmentation.
    Fragmentation,
    /// Discover routes by path-vector exchange, then forward as in
    /// fragmentation mode.
    PathVector,
}

impl Mode {
    fn wire_format(self, ttl_enabled: bool) -> WireFormat {
        match self {
            Mode::Forwarding if !ttl_enabled => WireFormat::Plain,
            Mode::Forwarding => WireFormat::Ttl,
            Mode::Fragmentation | Mode::PathVector => WireFormat::Fragmentation,
        }
    }

    fn fragmentation(self) -> bool {
        matches!(self, Mode::Fragmentation | Mode::PathVector)
    }
}

/// Everything resolved before a router starts.
#[derive(Debug)]
pub struct RouterConfig {
    pub addr: RouterAddr,
    pub mode: Mode,
    pub ttl_enabled: bool,
    /// How long the path-vector engine listens without news before assuming
    /// convergence.
    pub quiescence: Duration,
    /// Seed routes: the full table in forwarding modes, the neighbor links
    /// in path-vector mode.
    pub routes: ForwardingTable,
    /// Direct neighbors, path-vector mode only.
    pub neighbors: Vec<Neighbor>,
    /// Directory to persist the converged routing table into.
    pub table_out: Option<PathBuf>,
}

impl RouterConfig {
    pub fn new(addr: RouterAddr, mode: Mode) -> Self {
        Self {
            addr,
            mode,
            ttl_enabled: mode != Mode::Forwarding,
            quiescence: Duration::from_secs(10),
            routes: ForwardingTable::new(),
            neighbors: Vec::new(),
            table_out: None,
        }
    }
}

/// A payload that reached its destination, reassembled if need be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub at: RouterAddr,
    pub payload: Vec<u8>,
}

/// The observer side of a spawned router.
#[derive(Debug)]
pub struct RouterHandle {
    pub addr: RouterAddr,
    /// Payloads delivered at this router.
    pub delivered: mpsc::Receiver<Delivery>,
    /// Fires once, with the installed routes, when path-vector converges.
    pub converged: mpsc::Receiver<Vec<RouteEntry>>,
}

pub struct Router {
    processor: PacketProcessor,
    quiescence: Duration,
    table: ForwardingTable,
    reassembly: Reassembly,
    bgp: Option<PathVector>,
    transport: Transport,
    delivered: mpsc::Sender<Delivery>,
    converged: mpsc::Sender<Vec<RouteEntry>>,
    table_out: Option<PathBuf>,
    rng: SmallRng,
    /// Reassembly cull timers, earliest first.
    culls: VecDeque<(Instant, BufId, Epoch)>,
    /// Armed while the path-vector engine is listening.
    quiescence_deadline: Option<Instant>,
}

impl Router {
    pub fn new(config: RouterConfig, transport: Transport) -> (Self, RouterHandle) {
        let (delivered_tx, delivered_rx) = mpsc::channel(64);
        let (converged_tx, converged_rx) = mpsc::channel(1);
        let bgp = match config.mode {
            Mode::PathVector => Some(PathVector::new(config.addr, config.neighbors)),
            _ => None,
        };
        let router = Self {
            processor: PacketProcessor {
                local: config.addr,
                ttl_enabled: config.ttl_enabled,
                fragmentation: config.mode.fragmentation(),
                format: config.mode.wire_format(config.ttl_enabled),
            },
            quiescence: config.quiescence,
            table: config.routes,
            reassembly: Reassembly::new(),
            bgp,
            transport,
            delivered: delivered_tx,
            converged: converged_tx,
            table_out: config.table_out,
            rng: SmallRng::from_entropy(),
            culls: VecDeque::new(),
            quiescence_deadline: None,
        };
        let handle = RouterHandle {
            addr: config.addr,
            delivered: delivered_rx,
            converged: converged_rx,
        };
        (router, handle)
    }

    /// The receive-process-send loop. Runs until shut down.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        tracing::debug!("router {} up", self.transport.local());
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                datagram = self.transport.recv() => {
                    let (from, bytes) = datagram;
                    self.handle_datagram(from, &bytes);
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(far_future)),
                    if deadline.is_some() =>
                {
                    self.handle_timers();
                }
            }
        }
        tracing::debug!("router {} shut down", self.transport.local());
    }

    fn next_deadline(&self) -> Option<Instant> {
        let cull = self.culls.front().map(|&(at, _, _)| at);
        match (self.quiescence_deadline, cull) {
            (Some(q), Some(c)) => Some(q.min(c)),
            (q, c) => q.or(c),
        }
    }

    fn handle_datagram(&mut self, from: RouterAddr, bytes: &[u8]) {
        let packet = match Packet::from_wire(bytes, self.processor.format) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(
                    "{} discarding malformed datagram from {}: {}",
                    self.transport.local(),
                    from,
                    e,
                );
                return;
            }
        };

        if self.bgp.is_some() {
            if packet.payload == START_BGP {
                self.handle_start();
                return;
            }
            if Advertisement::is_batch(&packet.payload) {
                self.handle_batch(&packet.payload, from);
                return;
            }
        }

        match self.processor.process(
            packet,
            &mut self.table,
            &mut self.reassembly,
            &mut self.transport,
        ) {
            Outcome::Delivered(packet) => {
                tracing::info!(
                    "{} delivered {} byte message",
                    self.transport.local(),
                    packet.payload.len(),
                );
                let _ = self.delivered.try_send(Delivery {
                    at: self.transport.local(),
                    payload: packet.payload,
                });
            }
            Outcome::Buffered(window, buf_id, epoch) => {
                self.culls.push_back((Instant::now() + window, buf_id, epoch));
            }
            Outcome::Forwarded(count) => {
                tracing::debug!("{} forwarded {} fragment(s)", self.transport.local(), count);
            }
            Outcome::Dropped(reason) => {
                tracing::info!("{} dropped packet: {}", self.transport.local(), reason);
            }
        }
    }

    /// A start signal: propagate it, broadcast the seed paths, and listen.
    fn handle_start(&mut self) {
        let Some(bgp) = self.bgp.as_mut() else { return };
        if !bgp.start_listening() {
            return;
        }
        let neighbors = bgp.neighbors().to_vec();
        let batch = bgp.advertisement();
        for neighbor in &neighbors {
            self.send_control(neighbor.addr, START_BGP.to_vec());
        }
        self.broadcast(&neighbors, &batch);
        self.arm_quiescence();
    }

    fn handle_batch(&mut self, payload: &[u8], from: RouterAddr) {
        let batch = match Advertisement::from_payload(payload) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(
                    "{} discarding malformed advertisement from {}: {}",
                    self.transport.local(),
                    from,
                    e,
                );
                return;
            }
        };
        let advertise = match self.bgp.as_mut() {
            Some(bgp) if bgp.state() != BgpState::Converged => {
                // A batch arriving while idle doubles as a start signal.
                let started = bgp.start_listening();
                let modified = bgp.process_batch(&batch);
                if modified {
                    bgp.take_pending_change();
                }
                (started || modified)
                    .then(|| (bgp.neighbors().to_vec(), bgp.advertisement()))
            }
            _ => return,
        };
        if let Some((neighbors, batch)) = advertise {
            self.broadcast(&neighbors, &batch);
            self.arm_quiescence();
        }
    }

    fn broadcast(&mut self, neighbors: &[Neighbor], batch: &Advertisement) {
        let payload = batch.to_payload();
        for neighbor in neighbors {
            self.send_control(neighbor.addr, payload.clone());
        }
    }

    fn send_control(&mut self, to: RouterAddr, payload: Vec<u8>) {
        let packet = Packet::new(to, self.rng.gen(), payload);
        let bytes = packet.to_wire(self.processor.format);
        self.transport.send(to, bytes);
    }

    fn arm_quiescence(&mut self) {
        self.quiescence_deadline = Some(Instant::now() + self.quiescence);
    }

    fn handle_timers(&mut self) {
        let now = Instant::now();
        while let Some(&(at, buf_id, epoch)) = self.culls.front() {
            if at > now {
                break;
            }
            self.culls.pop_front();
            if self.reassembly.maybe_cull_pending(buf_id, epoch) {
                tracing::warn!(
                    "{} discarding partial reassembly for id {}",
                    self.transport.local(),
                    buf_id.id,
                );
            }
        }
        if matches!(self.quiescence_deadline, Some(at) if at <= now) {
            self.quiescence_deadline = None;
            self.finish_path_vector();
        }
    }

    /// Quiescence elapsed with no news: translate the known paths into
    /// routes, install them, persist, and go quiet.
    fn finish_path_vector(&mut self) {
        let entries = match self.bgp.as_mut() {
            Some(bgp) if bgp.state() == BgpState::Listening => bgp.converge(),
            _ => return,
        };
        for entry in &entries {
            self.table.insert(entry.clone());
        }
        tracing::info!(
            "{} converged with routes to {} destinations",
            self.transport.local(),
            entries.len(),
        );
        if let Some(dir) = &self.table_out {
            if let Err(e) = table_io::save_path_table(dir, self.transport.local(), &entries) {
                tracing::error!(
                    "{} failed to persist routing table: {}",
                    self.transport.local(),
                    e,
                );
            }
        }
        let _ = self.converged.try_send(entries);
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24)
}
