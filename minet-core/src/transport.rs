//! The datagram transport between routers: best-effort, unordered, no retry.
//!
//! The whole simulated internet is one address-to-inbox map. Attaching an
//! address yields a [`Transport`], the only handle a router (or a test
//! endpoint) ever holds; routers share no other state.

use crate::addr::RouterAddr;
use dashmap::DashMap;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One datagram in flight: the sender's address and the raw bytes.
pub type Datagram = (RouterAddr, Vec<u8>);

/// Inbox depth per attached address. A full inbox drops datagrams, which is
/// within the transport's best-effort contract.
const INBOX_CAPACITY: usize = 64;

type Inboxes = Arc<DashMap<RouterAddr, mpsc::Sender<Datagram>>>;

/// The shared medium connecting every router in one simulation.
#[derive(Debug, Clone, Default)]
pub struct Network {
    inboxes: Inboxes,
    /// Probability that any single send is silently lost.
    loss_rate: f64,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network that loses roughly `loss_rate` of all datagrams.
    pub fn with_loss(loss_rate: f64) -> Self {
        Self {
            inboxes: Default::default(),
            loss_rate,
        }
    }

    /// Claims an address on the network and returns its transport handle.
    ///
    /// Panics if the address is already attached; a simulation configuring
    /// two routers on one address is misbuilt.
    pub fn attach(&self, addr: RouterAddr) -> Transport {
        let (sender, receiver) = mpsc::channel(INBOX_CAPACITY);
        let previous = self.inboxes.insert(addr, sender);
        assert!(previous.is_none(), "{addr} is already attached");
        Transport {
            local: addr,
            inboxes: self.inboxes.clone(),
            receiver,
            loss_rate: self.loss_rate,
            rng: SmallRng::from_entropy(),
        }
    }
}

/// One router's view of the network: send anywhere, receive what arrives.
#[derive(Debug)]
pub struct Transport {
    local: RouterAddr,
    inboxes: Inboxes,
    receiver: mpsc::Receiver<Datagram>,
    loss_rate: f64,
    rng: SmallRng,
}

impl Transport {
    pub fn local(&self) -> RouterAddr {
        self.local
    }

    /// Sends a datagram, best-effort. Unknown destinations, full inboxes,
    /// and simulated loss all drop silently; nothing at this layer retries.
    pub fn send(&mut self, to: RouterAddr, bytes: Vec<u8>) {
        if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
            tracing::trace!("lost datagram {} -> {}", self.local, to);
            return;
        }
        let Some(inbox) = self.inboxes.get(&to).map(|entry| entry.value().clone()) else {
            tracing::debug!("no endpoint at {}, dropping datagram from {}", to, self.local);
            return;
        };
        if let Err(e) = inbox.try_send((self.local, bytes)) {
            tracing::debug!("inbox at {} rejected datagram: {}", to, e);
        }
    }

    /// Waits for the next datagram addressed here.
    pub async fn recv(&mut self) -> Datagram {
        match self.receiver.recv().await {
            Some(datagram) => datagram,
            // The network map holds our sender, so the channel outlives us.
            None => unreachable!("inbox sender dropped while attached"),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Detach so later sends to this address become ordinary drops.
        self.inboxes.remove(&self.local);
    }
}
