//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`SweepEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;
use xyplot_core::types::DbId;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A batch was expanded and its rows created.
pub const EVENT_BATCH_ENQUEUED: &str = "batch.enqueued";
/// A generation entered `running`.
pub const EVENT_GENERATION_RUNNING: &str = "generation.running";
/// A generation entered `completed`.
pub const EVENT_GENERATION_COMPLETED: &str = "generation.completed";
/// A generation entered `failed`.
pub const EVENT_GENERATION_FAILED: &str = "generation.failed";
/// A generation task hit a store error and could not record its own state.
pub const EVENT_GENERATION_ERRORED: &str = "generation.errored";

// ---------------------------------------------------------------------------
// SweepEvent
// ---------------------------------------------------------------------------

/// A lifecycle event for a batch or a single generation.
///
/// Constructed via [`SweepEvent::new`] and enriched with
/// [`with_generation`](SweepEvent::with_generation),
/// [`with_batch`](SweepEvent::with_batch) and
/// [`with_payload`](SweepEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEvent {
    /// Dot-separated event name, e.g. `"generation.completed"`.
    pub event_type: String,

    pub generation_id: Option<DbId>,

    pub batch_id: Option<Uuid>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl SweepEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            generation_id: None,
            batch_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_generation(mut self, generation_id: DbId) -> Self {
        self.generation_id = Some(generation_id);
        self
    }

    pub fn with_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use xyplot_events::bus::{EventBus, SweepEvent, EVENT_GENERATION_RUNNING};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(SweepEvent::new(EVENT_GENERATION_RUNNING).with_generation(1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<SweepEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: SweepEvent) {
        tracing::trace!(event_type = %event.event_type, "Publishing sweep event");
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let batch_id = Uuid::new_v4();

        bus.publish(
            SweepEvent::new(EVENT_GENERATION_FAILED)
                .with_generation(42)
                .with_batch(batch_id)
                .with_payload(serde_json::json!({"error": "timeout"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, EVENT_GENERATION_FAILED);
        assert_eq!(received.generation_id, Some(42));
        assert_eq!(received.batch_id, Some(batch_id));
        assert_eq!(received.payload["error"], "timeout");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(SweepEvent::new(EVENT_BATCH_ENQUEUED));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event_type, EVENT_BATCH_ENQUEUED);
        assert_eq!(e2.event_type, EVENT_BATCH_ENQUEUED);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(SweepEvent::new("orphan.event"));
    }

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = SweepEvent::new("bare.event");
        assert!(event.generation_id.is_none());
        assert!(event.batch_id.is_none());
        assert!(event.payload.is_object());
    }
}
