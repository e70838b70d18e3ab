use crate::status::FleetStatus;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Fan-out of published snapshots to every connected observer.
///
/// Each observer owns a bounded receiver. Sending never waits on observers: a
/// receiver that falls behind loses its oldest messages and reports the lag.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<String>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends a snapshot to current subscribers. Returns how many received it.
    pub fn publish(&self, status: &FleetStatus) -> usize {
        let msg = status.to_event().to_string();
        match self.tx.send(msg) {
            Ok(n) => n,
            Err(_) => {
                debug!("No observers connected, dropping status update");
                0
            }
        }
    }

    /// Only messages published after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Next message for one observer, skipping over anything it missed while lagging.
/// Returns `None` once the channel is closed.
pub async fn next_update(rx: &mut broadcast::Receiver<String>) -> Option<String> {
    loop {
        match rx.recv().await {
            Ok(msg) => return Some(msg),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Observer lagged behind by {} status updates", n);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
