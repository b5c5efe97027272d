//! Cooperative shutdown.
//!
//! OS signals never touch the scheduler's resources directly. The signal
//! task only flips a shared flag; the scheduler observes it at each
//! suspension point and tears itself down on its own task.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Cloneable shutdown handle backed by a `watch` channel.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Returns `true` only for the call that actually
    /// started it; every later call is a no-op.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested (immediately if it
    /// already was).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Spawn a task that turns SIGINT / SIGTERM into `shutdown.trigger()`.
///
/// Keeps listening after the first signal so repeats are absorbed rather
/// than falling back to the default (abrupt) handler.
pub fn listen_for_signals(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match wait_for_signal().await {
                Ok(signal) => {
                    if shutdown.trigger() {
                        info!(signal, "Shutdown signal received");
                    } else {
                        debug!(signal, "Shutdown already in progress, ignoring signal");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for shutdown signals");
                    return;
                }
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "CTRL_C")
}
