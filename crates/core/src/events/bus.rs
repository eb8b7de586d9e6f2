use chrono::Utc;
use tokio::sync::broadcast;

use super::{EventEnvelope, LibraryEvent};

/// Handle for publishing library events.
///
/// Cheaply cloneable. Publishing never blocks or fails the caller; an event
/// published while nobody is subscribed is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: LibraryEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            topic: event.topic(),
            event,
        };
        if self.tx.send(envelope).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::ContentType;

    #[tokio::test]
    async fn test_emit_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(LibraryEvent::ScannerError {
            scanner_id: "s1".to_string(),
            error: "boom".to_string(),
        });

        let envelope = rx.recv().await.expect("Should receive event");
        assert_eq!(envelope.topic, "scanner:error");
        assert!(matches!(envelope.event, LibraryEvent::ScannerError { .. }));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.clone().subscribe();

        bus.emit(LibraryEvent::EntityAdded {
            content_type: ContentType::Person,
            id: "p1".to_string(),
            name: "Jun Maeda".to_string(),
        });

        assert_eq!(rx1.recv().await.unwrap().topic, "person:added");
        assert_eq!(rx2.recv().await.unwrap().topic, "person:added");
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(LibraryEvent::ScannerError {
            scanner_id: "s1".to_string(),
            error: "nobody listening".to_string(),
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = LibraryEvent::EntityAdded {
            content_type: ContentType::Game,
            id: "g1".to_string(),
            name: "Foo".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "entity_added");
        assert_eq!(json["content_type"], "game");
    }
}
