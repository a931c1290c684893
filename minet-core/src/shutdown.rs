//! Externally shutting down a running simulation.

use tokio::sync::broadcast;

/// A handle used to shut down every router cloned from the same simulation.
///
/// Each clone listens from the moment it is created, so a router given a
/// clone before its task starts cannot miss the signal.
#[derive(Debug)]
pub struct Shutdown {
    notify: broadcast::Sender<ExitStatus>,
    listener: broadcast::Receiver<ExitStatus>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, listener) = broadcast::channel(1);
        Self { notify, listener }
    }

    /// Sends `ExitStatus::Exited` to all `Shutdown`s cloned from this one.
    pub fn shut_down(&self) {
        self.shut_down_with_status(ExitStatus::Exited);
    }

    /// Sends `status` to all `Shutdown`s cloned from this one.
    pub fn shut_down_with_status(&self, status: ExitStatus) {
        if let Err(e) = self.notify.send(status) {
            tracing::error!("failed to initiate shutdown: {}", e);
        }
    }

    /// Waits to receive a shutdown status.
    pub async fn wait_for_shutdown(&mut self) -> ExitStatus {
        use broadcast::error::RecvError;
        loop {
            match self.listener.recv().await {
                Ok(status) => return status,
                // We hold our own sender, so the channel never closes.
                Err(RecvError::Closed) => unreachable!(),
                Err(RecvError::Lagged(_)) => (),
            }
        }
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self {
            notify: self.notify.clone(),
            listener: self.notify.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExitStatus {
    Exited,
    TimedOut,
}
