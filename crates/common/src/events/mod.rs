//! Client-wide event bus
//!
//! The presentation layer subscribes here for the three signals the API
//! layer raises on its own: sign-in required, failed mutations and read
//! failures that exhausted their retries.

use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Signal raised by the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The session could not be recovered; the user must sign in again.
    Unauthenticated,
    /// A mutation failed after its single retry.
    MutationFailed { message: String },
    /// A read failed after exhausting its retry budget.
    QueryFailed { key: String, message: String },
}

/// Broadcast sender for [`ClientEvent`]s.
///
/// Cloning shares the same channel. Emitting with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        debug!(?event, "client event");
        let _ = self.tx.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(ClientEvent::MutationFailed { message: "boom".into() });
        bus.emit(ClientEvent::Unauthenticated);

        assert_eq!(
            rx.recv().await.unwrap(),
            ClientEvent::MutationFailed { message: "boom".into() }
        );
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::Unauthenticated);
    }

    #[test]
    fn emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.receiver_count(), 0);
        bus.emit(ClientEvent::Unauthenticated);
    }
}
