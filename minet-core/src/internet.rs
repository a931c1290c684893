//! The top-level driver for a simulation.
//!
//! An [`Internet`] owns the shared [`Network`], spawns each configured
//! router on its own task, and waits for the simulation to announce its
//! own end through the shared [`Shutdown`] handle. Dropping the driver
//! shuts every router down.

use crate::addr::RouterAddr;
use crate::router::{Router, RouterConfig, RouterHandle};
use crate::shutdown::{ExitStatus, Shutdown};
use crate::transport::{Network, Transport};
use std::time::Duration;
use tokio::task::JoinSet;

pub struct Internet {
    network: Network,
    routers: JoinSet<()>,
    shutdown: Shutdown,
}

impl Internet {
    pub fn new() -> Self {
        Self::over(Network::new())
    }

    /// A simulation on a lossy network.
    pub fn with_loss(loss_rate: f64) -> Self {
        Self::over(Network::with_loss(loss_rate))
    }

    fn over(network: Network) -> Self {
        Self {
            network,
            routers: JoinSet::new(),
            shutdown: Shutdown::new(),
        }
    }

    /// Spawns a router onto its own task and returns the handle for
    /// observing it.
    pub fn add_router(&mut self, config: RouterConfig) -> RouterHandle {
        let transport = self.network.attach(config.addr);
        let (router, handle) = Router::new(config, transport);
        self.routers.spawn(router.run(self.shutdown.clone()));
        handle
    }

    /// Attaches a non-router endpoint, for injecting traffic and receiving
    /// deliveries addressed to `addr`.
    pub fn endpoint(&self, addr: RouterAddr) -> Transport {
        self.network.attach(addr)
    }

    /// A handle a simulation can use to end itself.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Waits until some participant signals shutdown.
    pub async fn wait(&mut self) -> ExitStatus {
        self.shutdown.wait_for_shutdown().await
    }

    /// Waits like [`Internet::wait`], but gives up after `duration` and
    /// shuts the simulation down with [`ExitStatus::TimedOut`].
    pub async fn wait_with_timeout(&mut self, duration: Duration) -> ExitStatus {
        match tokio::time::timeout(duration, self.shutdown.wait_for_shutdown()).await {
            Ok(status) => status,
            Err(_) => {
                self.shutdown.shut_down_with_status(ExitStatus::TimedOut);
                ExitStatus::TimedOut
            }
        }
    }
}

impl Default for Internet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Internet {
    fn drop(&mut self) {
        self.shutdown.shut_down();
    }
}
