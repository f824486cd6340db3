//! Internal events
//!
//! Services coordinate through events on a broadcast channel; the dispatcher asks the
//! poller for a refresh this way, and tests observe outcomes through it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Event kinds emitted by the bridge services
pub mod kinds {
    pub const COMMAND_SUCCEEDED: &str = "command/succeeded";
    /// Retry budget exhausted on transient failures
    pub const COMMAND_ABANDONED: &str = "command/abandoned";
    /// Terminal failure, not retried
    pub const COMMAND_FAILED: &str = "command/failed";
    /// Request an immediate poll of `device`
    pub const DEVICE_REFRESH: &str = "device/refresh";
    pub const TELEMETRY_PUBLISHED: &str = "telemetry/published";
    pub const TELEMETRY_FAILED: &str = "telemetry/failed";
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: String,
    /// Id of the emitting service
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            device: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn for_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Match against a subscription pattern
    ///
    /// `*` matches everything, `command/*` matches every kind under `command/`, anything
    /// else must equal the kind.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') => self.kind.starts_with(prefix),
            _ => self.kind == pattern,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(|v| v.as_u64())
    }
}

/// Cloneable handle for emitting events
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<Event>,
}

impl EventPublisher {
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Returns the number of receivers reached; none listening is not an error
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn emit(&self, kind: &str, source: &str, device: Option<&str>, data: serde_json::Value) {
        let mut event = Event::new(kind, source).with_data(data);
        event.device = device.map(str::to_string);
        self.publish(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching() {
        let event = Event::new(kinds::COMMAND_FAILED, "dispatcher");

        assert!(event.matches("command/failed"));
        assert!(!event.matches("command/succeeded"));
        assert!(event.matches("*"));
        assert!(event.matches("command/*"));
        assert!(!event.matches("device/*"));

        let bare = Event::new("command", "dispatcher");
        assert!(!bare.matches("command/*"));
    }

    #[test]
    fn test_device_and_data() {
        let event = Event::new(kinds::COMMAND_SUCCEEDED, "dispatcher")
            .for_device("livingroom")
            .with_data(serde_json::json!({"attempts": 3, "note": "ok"}));

        assert_eq!(event.device.as_deref(), Some("livingroom"));
        assert_eq!(event.get_u64("attempts"), Some(3));
        assert_eq!(event.get_str("note"), Some("ok"));
    }

    #[tokio::test]
    async fn test_publisher() {
        let (tx, _) = broadcast::channel(8);
        let publisher = EventPublisher::new(tx);
        assert_eq!(publisher.publish(Event::new("x", "y")), 0);

        let mut rx = publisher.subscribe();
        publisher.emit(kinds::DEVICE_REFRESH, "dispatcher", Some("kitchen"), serde_json::Value::Null);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "device/refresh");
        assert_eq!(event.device.as_deref(), Some("kitchen"));
    }
}
