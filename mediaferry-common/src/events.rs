//! Event types and the in-process event bus
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE clients.

use crate::media::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Backend events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FerryEvent {
    /// A content service or the API requested a new item
    ItemRequested {
        imdb_id: String,
        requested_by: String,
        timestamp: DateTime<Utc>,
    },

    /// A root item was persisted with a different state than before
    ItemStateChanged {
        item_id: String,
        title: Option<String>,
        old_state: Option<State>,
        new_state: State,
        timestamp: DateTime<Utc>,
    },

    /// A root item was removed through the API
    ItemRemoved {
        item_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A service run failed
    ServiceError {
        service: String,
        item_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Settings were changed and services re-initialized
    SettingsChanged {
        keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl FerryEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            FerryEvent::ItemRequested { .. } => "ItemRequested",
            FerryEvent::ItemStateChanged { .. } => "ItemStateChanged",
            FerryEvent::ItemRemoved { .. } => "ItemRemoved",
            FerryEvent::ServiceError { .. } => "ServiceError",
            FerryEvent::SettingsChanged { .. } => "SettingsChanged",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a `tokio::sync::broadcast` channel: publishing never blocks and
/// slow subscribers observe `Lagged` instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FerryEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<FerryEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FerryEvent,
    ) -> Result<usize, broadcast::error::SendError<FerryEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: FerryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(FerryEvent::ItemRemoved {
            item_id: "tt0133093".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "ItemRemoved");
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(10);
        let result = bus.emit(FerryEvent::SettingsChanged {
            keys: vec!["plex".to_string()],
            timestamp: Utc::now(),
        });
        assert!(result.is_err());

        // lossy variant never fails
        bus.emit_lossy(FerryEvent::SettingsChanged {
            keys: vec![],
            timestamp: Utc::now(),
        });
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = FerryEvent::ItemStateChanged {
            item_id: "tt0944947".to_string(),
            title: Some("Game of Thrones".to_string()),
            old_state: Some(State::Indexed),
            new_state: State::Scraped,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ItemStateChanged");
        assert_eq!(json["new_state"], "Scraped");
        assert_eq!(json["old_state"], "Indexed");
    }
}
