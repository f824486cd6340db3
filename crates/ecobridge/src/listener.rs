//! Command listener
//!
//! Subscribes to `<base>/+/set`, parses each message and enqueues it for the dispatcher.
//! Bad payloads and a full queue are logged and dropped; nothing here touches BLE.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, MessageBus, Topics};
use crate::command::{InboundCommand, QueuedCommand};
use crate::error::BridgeResult;
use crate::queue::CommandQueue;
use crate::service::{Service, ServiceContext, ServiceError, ServiceResult, ServiceSpec};

pub const SERVICE_ID: &str = "command-listener";

pub struct CommandListener {
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    queue: Arc<CommandQueue>,
    task: Option<JoinHandle<()>>,
}

impl CommandListener {
    pub fn new(bus: Arc<dyn MessageBus>, topics: Topics, queue: Arc<CommandQueue>) -> Self {
        Self {
            bus,
            topics,
            queue,
            task: None,
        }
    }
}

/// Turn one bus message into a queued command
pub fn accept(topics: &Topics, queue: &CommandQueue, message: &BusMessage) -> BridgeResult<()> {
    let Some(device) = topics.command_device(&message.topic) else {
        debug!(topic = %message.topic, "Not a command topic");
        return Ok(());
    };
    let command = InboundCommand::parse(&message.payload)?.to_boost()?;
    queue.push_back(QueuedCommand::new(device, command))?;
    info!(device, pending = queue.len(), "Command queued");
    Ok(())
}

async fn listen(
    mut rx: broadcast::Receiver<BusMessage>,
    topics: Topics,
    queue: Arc<CommandQueue>,
) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                if let Err(e) = accept(&topics, &queue, &message) {
                    warn!(topic = %message.topic, error = %e, "Dropping command");
                }
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "Command subscription lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl Service for CommandListener {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(SERVICE_ID, "Command Listener")
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        let filter = self.topics.command_filter();
        let rx = self
            .bus
            .subscribe(&filter)
            .await
            .map_err(|e| ServiceError::StartFailed(e.to_string()))?;
        info!(%filter, "Listening for commands");

        self.task = Some(tokio::spawn(listen(
            rx,
            self.topics.clone(),
            Arc::clone(&self.queue),
        )));
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::error::BridgeError;
    use crate::service::ServiceManager;
    use std::time::Duration;

    const BOOST: &str =
        r#"{"type": "boost", "boostEnabled": true, "boostOffsetDegrees": 2.5, "boostSetpointMinutes": 30}"#;

    #[test]
    fn test_accept() {
        let topics = Topics::new("ECO16BT");
        let queue = CommandQueue::new(1);

        accept(&topics, &queue, &BusMessage::new("ECO16BT/livingroom/set", BOOST)).unwrap();
        assert_eq!(queue.len(), 1);

        // Queue full
        assert!(matches!(
            accept(&topics, &queue, &BusMessage::new("ECO16BT/kitchen/set", BOOST)),
            Err(BridgeError::QueueFull { .. })
        ));
        assert!(matches!(
            accept(&topics, &queue, &BusMessage::new("ECO16BT/kitchen/set", "{}")),
            Err(BridgeError::InvalidCommand(_))
        ));
        // Not a command topic
        accept(&topics, &queue, &BusMessage::new("ECO16BT/kitchen", BOOST)).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_listener_enqueues_from_bus() {
        let manager = ServiceManager::new();
        let bus = Arc::new(InMemoryBus::new());
        let queue = Arc::new(CommandQueue::new(8));
        let listener = CommandListener::new(bus.clone(), Topics::new("ECO16BT"), Arc::clone(&queue));
        manager.spawn(listener).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        bus.inject("ECO16BT/livingroom/set", BOOST);
        bus.inject("ECO16BT/livingroom/set", "garbage");
        let entry = tokio::time::timeout(Duration::from_secs(1), queue.pop())
            .await
            .unwrap();

        assert_eq!(entry.device, "livingroom");
        assert_eq!(entry.command.offset_centi_degrees, 250);
        assert_eq!(entry.attempts, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_empty());

        manager.shutdown_all().await.unwrap();
    }
}
