//! Message bus boundary
//!
//! Telemetry goes out and commands come in over a topic-addressed bus. Subscriptions use
//! MQTT filter syntax (`+` one level, `#` the rest).

pub mod memory;
pub mod mqtt;

pub use memory::InMemoryBus;
pub use mqtt::MqttBus;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use wildmatch::WildMatch;

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to '{filter}' failed: {reason}")]
    Subscribe { filter: String, reason: String },

    #[error("message bus closed")]
    Closed,
}

pub type BusResult<T> = Result<T, BusError>;

/// A message delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Receive every message whose topic matches `filter`
    async fn subscribe(&self, filter: &str) -> BusResult<broadcast::Receiver<BusMessage>>;
}

/// MQTT filter match
///
/// `points/+/temp` matches `points/VAV-101/temp`; `points/#` matches anything below
/// `points/`.
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    if !filter.contains(['+', '#']) {
        return topic == filter;
    }

    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    for (i, level) in filter_levels.iter().enumerate() {
        match *level {
            "#" => return true,
            "+" => {
                if i >= topic_levels.len() {
                    return false;
                }
            }
            pattern => match topic_levels.get(i) {
                Some(actual) if WildMatch::new(pattern).matches(actual) => {}
                _ => return false,
            },
        }
    }
    topic_levels.len() == filter_levels.len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Topics
// ─────────────────────────────────────────────────────────────────────────────

/// Topic layout under one base prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Snapshot JSON for `device`
    pub fn telemetry(&self, device: &str) -> String {
        format!("{}/{device}", self.base)
    }

    /// Boost state read back after a successful command
    pub fn boost(&self, device: &str) -> String {
        format!("{}/{device}/boost", self.base)
    }

    pub fn availability(&self, device: &str) -> String {
        format!("{}/{device}/available", self.base)
    }

    /// Filter matching every device's command topic
    pub fn command_filter(&self) -> String {
        format!("{}/+/set", self.base)
    }

    /// Device name from a command topic
    pub fn command_device<'t>(&self, topic: &'t str) -> Option<&'t str> {
        let device = topic
            .strip_prefix(self.base.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")?;
        (!device.is_empty() && !device.contains('/')).then_some(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("ECO16BT/livingroom/set", "ECO16BT/livingroom/set"));
        assert!(topic_matches("ECO16BT/livingroom/set", "ECO16BT/+/set"));
        assert!(topic_matches("ECO16BT/livingroom/set", "ECO16BT/#"));
        assert!(topic_matches("ECO16BT/livingroom", "#"));
        assert!(!topic_matches("ECO16BT/livingroom", "ECO16BT/+/set"));
        assert!(!topic_matches("ECO16BT/a/b/set", "ECO16BT/+/set"));
        assert!(!topic_matches("OTHER/livingroom/set", "ECO16BT/+/set"));
    }

    #[test]
    fn test_topics() {
        let topics = Topics::new("ECO16BT");
        assert_eq!(topics.telemetry("livingroom"), "ECO16BT/livingroom");
        assert_eq!(topics.boost("livingroom"), "ECO16BT/livingroom/boost");
        assert_eq!(topics.availability("livingroom"), "ECO16BT/livingroom/available");
        assert_eq!(topics.command_filter(), "ECO16BT/+/set");

        assert_eq!(topics.command_device("ECO16BT/livingroom/set"), Some("livingroom"));
        assert_eq!(topics.command_device("ECO16BT/livingroom/boost"), None);
        assert_eq!(topics.command_device("ECO16BT//set"), None);
        assert_eq!(topics.command_device("OTHER/livingroom/set"), None);
    }
}
