//! Splitting packets across MTU-constrained links and putting them back
//! together at the destination.

use crate::addr::RouterAddr;
use crate::packet::Packet;
use std::collections::{hash_map::Entry, HashMap};
use std::time::Duration;

/// How long a reassembly buffer may sit idle before its partial data is
/// discarded.
pub const IDLE_WINDOW: Duration = Duration::from_secs(15);

/// Distinguishes cull timers armed for different lifetimes of one buffer.
pub type Epoch = u16;

/// The result of packet fragmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragments {
    /// The packet fits in the MTU and is unchanged.
    Single(Packet),
    /// The packet was split into ordered fragments.
    Fragmented(Vec<Packet>),
}

impl Fragments {
    pub fn count(&self) -> usize {
        match self {
            Fragments::Single(_) => 1,
            Fragments::Fragmented(fragments) => fragments.len(),
        }
    }

    pub fn into_packets(self) -> Vec<Packet> {
        match self {
            Fragments::Single(packet) => vec![packet],
            Fragments::Fragmented(fragments) => fragments,
        }
    }
}

/// Divides a packet into pieces whose payloads fit within the link MTU.
///
/// Fragments share the original's destination, TTL, id, and total size;
/// offsets are the cumulative sum of prior chunk sizes. Every chunk but the
/// last raises the more-fragments flag; the last inherits the incoming
/// packet's flag, so fragmenting a middle fragment again at a later hop with
/// a smaller MTU stays consistent.
pub fn fragment(mut packet: Packet, mtu: usize) -> Fragments {
    // A zero MTU cannot carry anything; treat it as unfragmentable.
    if mtu == 0 || packet.payload.len() <= mtu {
        return Fragments::Single(packet);
    }

    // Peel one MTU-sized chunk per iteration; the chunk count is bounded
    // only by the payload, so this must not recurse.
    let mut fragments = Vec::with_capacity(packet.payload.len() / mtu + 1);
    while packet.payload.len() > mtu {
        let rest = packet.payload.split_off(mtu);
        let tail = Packet {
            dest: packet.dest,
            ttl: packet.ttl,
            id: packet.id,
            offset: packet.offset + mtu,
            total: packet.total,
            more_fragments: packet.more_fragments,
            payload: rest,
        };
        packet.more_fragments = true;
        fragments.push(packet);
        packet = tail;
    }
    fragments.push(packet);
    Fragments::Fragmented(fragments)
}

/// Identifies the reassembly buffer a fragment belongs to. The wire carries
/// only the destination address, so the id is scoped per destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufId {
    pub addr: RouterAddr,
    pub id: u16,
}

impl BufId {
    pub fn of(packet: &Packet) -> Self {
        Self {
            addr: packet.dest,
            id: packet.id,
        }
    }
}

/// The result of feeding one fragment to [`Reassembly::add_fragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddFragmentResult {
    /// The added fragment completed the packet.
    Complete(Packet),
    /// The packet is still incomplete. The caller should arm a timer for the
    /// given duration and call [`Reassembly::maybe_cull_pending`] with the
    /// provided [`BufId`] and [`Epoch`] when it expires.
    Incomplete(Duration, BufId, Epoch),
}

/// Accumulates fragments until the byte range `[0, total)` is fully covered,
/// then yields the completed packet.
#[derive(Debug, Default)]
pub struct Reassembly {
    pending: HashMap<BufId, Pending>,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fragment(&mut self, packet: Packet) -> AddFragmentResult {
        let buf_id = BufId::of(&packet);
        if !packet.is_fragment() {
            // A whole packet supersedes any partial state under the same id.
            self.pending.remove(&buf_id);
            return AddFragmentResult::Complete(packet);
        }

        let pending = self
            .pending
            .entry(buf_id)
            .or_insert_with(|| Pending::new(packet.total));

        // Duplicate and overlapping ranges overwrite idempotently. A
        // fragment disagreeing about the total size is discarded; its buffer
        // keeps waiting for consistent data.
        if packet.total == pending.data.len() {
            let start = packet.offset;
            let end = start + packet.payload.len();
            pending.data[start..end].copy_from_slice(&packet.payload);
            pending.cover(start, end);
            if packet.offset == 0 {
                pending.ttl = packet.ttl;
            }
        } else {
            tracing::debug!(
                "discarding fragment for {}:{} with mismatched total size",
                buf_id.addr,
                buf_id.id,
            );
        }

        if pending.is_complete() {
            let pending = self.pending.remove(&buf_id).unwrap();
            let total = pending.data.len();
            return AddFragmentResult::Complete(Packet {
                dest: buf_id.addr,
                ttl: pending.ttl,
                id: buf_id.id,
                offset: 0,
                total,
                more_fragments: false,
                payload: pending.data,
            });
        }

        pending.epoch = pending.epoch.wrapping_add(1);
        AddFragmentResult::Incomplete(IDLE_WINDOW, buf_id, pending.epoch)
    }

    /// Discards the buffer if it has not changed since the cull timer was
    /// armed. Returns whether partial data was thrown away.
    pub fn maybe_cull_pending(&mut self, buf_id: BufId, epoch: Epoch) -> bool {
        match self.pending.entry(buf_id) {
            Entry::Occupied(pending) => {
                if pending.get().epoch == epoch {
                    pending.remove_entry();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug)]
struct Pending {
    data: Vec<u8>,
    /// Covered byte ranges, kept sorted and merged.
    covered: Vec<(usize, usize)>,
    ttl: u8,
    epoch: Epoch,
}

impl Pending {
    fn new(total: usize) -> Self {
        Self {
            data: vec![0; total],
            covered: Vec::new(),
            ttl: 0,
            epoch: 0,
        }
    }

    fn cover(&mut self, start: usize, end: usize) {
        self.covered.push((start, end));
        self.covered.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.covered.len());
        for &(start, end) in self.covered.iter() {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        self.covered = merged;
    }

    fn is_complete(&self) -> bool {
        self.covered == [(0, self.data.len())]
    }
}
