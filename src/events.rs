//! Event publish seam
//!
//! Post-confirmation side effects fan out through an injected publisher
//! rather than a process-wide emitter, so the core stays unit-testable.

use async_trait::async_trait;
use std::sync::Mutex;

/// Domain event emitted by the core after a durable state change
#[derive(Debug, Clone)]
pub struct DomainEvent {
    /// Event topic, e.g. "chain_op.confirmed" or "reconciliation.completed"
    pub topic: &'static str,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

/// Publish interface injected into workers
///
/// Delivery is best-effort: implementations must not propagate errors back
/// into the publishing worker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Publisher that drops all events (default for embedders without fan-out)
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: DomainEvent) {
        tracing::debug!(topic = event.topic, entity_id = %event.entity_id, "Event dropped (noop publisher)");
    }
}

/// Publisher that records events in memory, for tests and diagnostics
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events published so far
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("events lock poisoned").clone()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.topic).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) {
        self.events.lock().expect("events lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        publisher
            .publish(DomainEvent {
                topic: "chain_op.confirmed",
                entity_type: "subscription".to_string(),
                entity_id: "sub-1".to_string(),
                payload: serde_json::json!({"tx_hash": "0xabc"}),
            })
            .await;

        assert_eq!(publisher.topics(), vec!["chain_op.confirmed"]);
        assert_eq!(publisher.events()[0].entity_id, "sub-1");
    }
}
