//! Process-wide shutdown signal.
//!
//! One [`ShutdownController`] owns the signal; every task that must stop on
//! shutdown holds a cloned [`ShutdownSignal`].

use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownController {
    shutdown_tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            shutdown_rx: self.shutdown_tx.subscribe(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    shutdown_rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Resolves once shutdown is triggered or the controller is gone.
    pub async fn triggered(&mut self) {
        loop {
            if *self.shutdown_rx.borrow() {
                return;
            }
            if self.shutdown_rx.changed().await.is_err() {
                return;
            }
        }
    }
}
