//! Application-wide signals that are not part of the session.
//!
//! Publishing never fails: with no subscribers the event is simply dropped.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// Something spent or refunded credit; balance displays should re-fetch.
    CreditUpdated,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    pub fn publish(&self, event: AppEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(?event, receivers, "Event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
