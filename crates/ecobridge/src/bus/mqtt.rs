//! MQTT adapter
//!
//! One `rumqttc` client plus an event-loop task. The task re-subscribes every known
//! filter after each ConnAck, so subscriptions survive broker restarts, and fans
//! incoming publishes out to the matching subscribers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{BusError, BusMessage, BusResult, MessageBus, topic_matches};
use crate::config::MqttConfig;

const REQUEST_CAPACITY: usize = 64;
const CHANNEL_CAPACITY: usize = 100;

type Subscribers = Arc<DashMap<String, broadcast::Sender<BusMessage>>>;

pub struct MqttBus {
    client: AsyncClient,
    subscribers: Subscribers,
    event_loop: JoinHandle<()>,
}

impl MqttBus {
    /// Create the client and start driving its event loop
    ///
    /// Connection happens in the background; publishes issued before the first ConnAck
    /// are queued by the client.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let subscribers: Subscribers = Arc::new(DashMap::new());

        info!(host = %config.host, port = config.port, "Connecting to MQTT broker");
        let event_loop = tokio::spawn(drive(
            event_loop,
            client.clone(),
            Arc::clone(&subscribers),
            config.reconnect_delay,
        ));

        Self {
            client,
            subscribers,
            event_loop,
        }
    }

    /// Send a DISCONNECT and stop the event loop
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect failed");
        }
        self.event_loop.abort();
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str) -> BusResult<broadcast::Receiver<BusMessage>> {
        let receiver = self
            .subscribers
            .entry(filter.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        self.client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| BusError::Subscribe {
                filter: filter.to_string(),
                reason: e.to_string(),
            })?;
        Ok(receiver)
    }
}

async fn drive(
    mut event_loop: EventLoop,
    client: AsyncClient,
    subscribers: Subscribers,
    reconnect_delay: Duration,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                let filters: Vec<String> = subscribers.iter().map(|e| e.key().clone()).collect();
                for filter in filters {
                    if let Err(e) = client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                        warn!(%filter, error = %e, "Re-subscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BusMessage::new(publish.topic, publish.payload.to_vec());
                trace!(topic = %message.topic, "MQTT message");
                for entry in subscribers.iter() {
                    if topic_matches(&message.topic, entry.key()) {
                        let _ = entry.value().send(message.clone());
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, delay = ?reconnect_delay, "MQTT connection error, reconnecting");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}
