//! In-process bus for tests and dry runs

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{BusMessage, BusResult, MessageBus, topic_matches};

const CHANNEL_CAPACITY: usize = 100;

/// Broadcast fan-out keyed by subscription filter, with a record of everything published
#[derive(Default)]
pub struct InMemoryBus {
    channels: DashMap<String, broadcast::Sender<BusMessage>>,
    published: Mutex<Vec<BusMessage>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message as if it arrived from the broker, without recording it
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        self.fan_out(BusMessage::new(topic, payload))
    }

    /// Everything published so far, oldest first
    pub fn published(&self) -> Vec<BusMessage> {
        self.published.lock().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<BusMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    fn fan_out(&self, message: BusMessage) -> usize {
        let mut notified = 0;
        for entry in self.channels.iter() {
            if topic_matches(&message.topic, entry.key()) {
                // No receivers left is fine
                if let Ok(n) = entry.value().send(message.clone()) {
                    notified += n;
                }
            }
        }
        trace!(topic = %message.topic, notified, "Delivered");
        notified
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        let message = BusMessage::new(topic, payload);
        self.published.lock().push(message.clone());
        self.fan_out(message);
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> BusResult<broadcast::Receiver<BusMessage>> {
        let sender = self
            .channels
            .entry(filter.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        debug!(filter, "New subscription");
        Ok(sender.subscribe())
    }
}
