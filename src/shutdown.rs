//! Cooperative cancellation shared by the accept loop, sessions and the monitor.

use tokio::sync::watch;

/// Owner side. Triggering is idempotent.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Observer side, cheap to clone into every activity.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered. Never resolves if the owner
    /// was dropped without triggering.
    pub async fn recv(&mut self) {
        let owner_gone = self.rx.wait_for(|stop| *stop).await.is_err();
        if owner_gone {
            std::future::pending::<()>().await;
        }
    }
}
