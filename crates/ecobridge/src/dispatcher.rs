//! Command dispatcher
//!
//! Single consumer of the [`CommandQueue`]. Commands run strictly one at a time: resolve
//! the device, open an authorised session, write the encoded boost and read the state
//! back. A transient transport failure puts the command back at the head of the queue
//! with its attempt count raised, then waits out the backoff, so nothing queued behind
//! it runs first. Every other failure is terminal.
//!
//! On success the read-back boost state goes to `<base>/<device>/boost` and a
//! `device/refresh` event asks the poller for a fresh snapshot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ecobridge_protocol::Characteristic;
use ecobridge_protocol::codec::{BoostState, decode_boost_state};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::{BleSession, BleTransport, DeviceLocks, close_session, open_session};
use crate::bus::{MessageBus, Topics};
use crate::command::QueuedCommand;
use crate::config::DispatcherConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::queue::CommandQueue;
use crate::registry::DeviceRegistry;
use crate::service::{EventPublisher, Service, ServiceContext, ServiceResult, ServiceSpec, kinds};

pub const SERVICE_ID: &str = "dispatcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// `None` retries until shutdown
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl From<&DispatcherConfig> for RetryPolicy {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            backoff: config.backoff,
            max_attempts: config.max_attempts,
        }
    }
}

struct DispatchWorker {
    queue: Arc<CommandQueue>,
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn BleTransport>,
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    locks: DeviceLocks,
    policy: RetryPolicy,
    events: EventPublisher,
}

pub struct Dispatcher {
    queue: Arc<CommandQueue>,
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn BleTransport>,
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    locks: DeviceLocks,
    policy: RetryPolicy,
    worker: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl Dispatcher {
    pub fn new(
        policy: RetryPolicy,
        queue: Arc<CommandQueue>,
        registry: Arc<DeviceRegistry>,
        transport: Arc<dyn BleTransport>,
        bus: Arc<dyn MessageBus>,
        topics: Topics,
        locks: DeviceLocks,
    ) -> Self {
        Self {
            queue,
            registry,
            transport,
            bus,
            topics,
            locks,
            policy,
            worker: None,
        }
    }
}

#[async_trait]
impl Service for Dispatcher {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(SERVICE_ID, "Command Dispatcher")
    }

    async fn on_start(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = DispatchWorker {
            queue: Arc::clone(&self.queue),
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
            bus: Arc::clone(&self.bus),
            topics: self.topics.clone(),
            locks: self.locks.clone(),
            policy: self.policy,
            events: ctx.publisher(),
        };
        let task = tokio::spawn(worker.run(stop_rx));
        self.worker = Some((stop_tx, task));
        info!(
            backoff = ?self.policy.backoff,
            max_attempts = ?self.policy.max_attempts,
            "Command dispatcher started"
        );
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        if let Some((stop_tx, task)) = self.worker.take() {
            let _ = stop_tx.send(true);
            if let Err(e) = task.await {
                error!(error = %e, "Dispatcher worker panicked");
            }
        }
        Ok(())
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = stop.wait_for(|stop| *stop).await;
}

impl DispatchWorker {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        loop {
            let mut entry = tokio::select! {
                _ = stopped(&mut stop) => break,
                entry = self.queue.pop() => entry,
            };

            let outcome = tokio::select! {
                _ = stopped(&mut stop) => {
                    // Interrupted mid-command: the session was dropped and disconnects itself
                    debug!(device = %entry.device, "Shutdown during command, keeping it queued");
                    self.queue.push_front(entry);
                    break;
                }
                outcome = self.execute(&entry) => outcome,
            };

            match outcome {
                Ok(state) => self.succeeded(&entry, state).await,
                Err(e) if e.is_retryable() => {
                    entry.attempts += 1;
                    if self.policy.exhausted(entry.attempts) {
                        error!(
                            device = %entry.device,
                            attempts = entry.attempts,
                            error = %e,
                            "Abandoning command"
                        );
                        self.events.emit(
                            kinds::COMMAND_ABANDONED,
                            SERVICE_ID,
                            Some(&entry.device),
                            json!({ "attempts": entry.attempts, "error": e.to_string() }),
                        );
                        continue;
                    }

                    warn!(
                        device = %entry.device,
                        attempts = entry.attempts,
                        error = %e,
                        "Command failed, retrying in {:?}",
                        self.policy.backoff
                    );
                    self.queue.push_front(entry);
                    tokio::select! {
                        _ = stopped(&mut stop) => break,
                        _ = tokio::time::sleep(self.policy.backoff) => {}
                    }
                }
                Err(e) => {
                    error!(device = %entry.device, error = %e, "Command failed");
                    self.events.emit(
                        kinds::COMMAND_FAILED,
                        SERVICE_ID,
                        Some(&entry.device),
                        json!({ "attempts": entry.attempts + 1, "error": e.to_string() }),
                    );
                }
            }
        }
        debug!(pending = self.queue.len(), "Dispatcher worker stopped");
    }

    async fn execute(&self, entry: &QueuedCommand) -> BridgeResult<BoostState> {
        let device = self.registry.resolve(&entry.device)?;
        let _guard = self.locks.acquire(&device.name).await;

        let mut session = open_session(self.transport.as_ref(), device).await?;
        let result = write_boost(session.as_mut(), entry).await;
        close_session(session, &device.name).await;
        result
    }

    async fn succeeded(&self, entry: &QueuedCommand, state: BoostState) {
        info!(device = %entry.device, attempts = entry.attempts + 1, "Command applied");

        match serde_json::to_vec(&state) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(&self.topics.boost(&entry.device), payload).await {
                    warn!(device = %entry.device, error = %e, "Failed to publish boost state");
                }
            }
            Err(e) => warn!(device = %entry.device, error = %e, "Failed to encode boost state"),
        }

        self.events.emit(
            kinds::COMMAND_SUCCEEDED,
            SERVICE_ID,
            Some(&entry.device),
            json!({ "attempts": entry.attempts + 1 }),
        );
        self.events.emit(
            kinds::DEVICE_REFRESH,
            SERVICE_ID,
            Some(&entry.device),
            serde_json::Value::Null,
        );
    }
}

async fn write_boost(session: &mut dyn BleSession, entry: &QueuedCommand) -> BridgeResult<BoostState> {
    let payload = entry.command.encode();
    debug!(device = %entry.device, ?payload, "Writing boost");
    session.write(Characteristic::Boost, &payload).await?;

    let raw = session.read(Characteristic::Boost).await?;
    let state = decode_boost_state(&raw)?;
    if state.enabled != entry.command.enabled {
        return Err(BridgeError::ProtocolInvariantViolation(format!(
            "boost read back as enabled={} after writing enabled={}",
            state.enabled, entry.command.enabled
        )));
    }
    Ok(state)
}
