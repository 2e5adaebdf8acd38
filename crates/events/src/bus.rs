//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`BoardEvent`]s.
//! It is shared via `Arc<EventBus>` between the state store, the engine
//! services and the WebSocket bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BoardEvent
// ---------------------------------------------------------------------------

/// Something observable happened on a board.
///
/// Constructed via [`BoardEvent::new`] and enriched with
/// [`with_payload`](BoardEvent::with_payload) and
/// [`with_from`](BoardEvent::with_from).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
    /// Slash-separated topic, e.g. `"states/boards/demo/counter/update"`.
    pub topic: String,

    /// Event-specific JSON payload. Empty object when there is nothing to say.
    pub payload: Value,

    /// Originating component (`"dispatcher"`, `"autopilot"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl BoardEvent {
    /// Create an event on `topic` with an empty object payload.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: Value::Object(Default::default()),
            from: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Tag the originating component.
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Whether the topic starts with `prefix` on a segment boundary.
    ///
    /// `"states/boards"` matches `"states/boards/demo/x/update"` but not
    /// `"states/boardsX/..."`. An empty prefix matches everything.
    pub fn matches(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match self.topic.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BoardEvent`].
pub struct EventBus {
    sender: broadcast::Sender<BoardEvent>,
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
    pub fn publish(&self, event: BoardEvent) {
        tracing::trace!(topic = %event.topic, "Publishing event");
        // A send error only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
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
