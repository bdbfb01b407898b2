use tracing::trace;

use crate::types::FlowEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to every subscriber. Returns how many receivers got the event.
    pub fn publish(&self, event: FlowEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(tokio::sync::broadcast::error::SendError(event)) => {
                trace!(?event, "No subscribers, event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
