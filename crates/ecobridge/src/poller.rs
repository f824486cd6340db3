//! Telemetry poller
//!
//! On every tick, reads a full snapshot from each registered device and publishes it to
//! `<base>/<device>`. A `device/refresh` event triggers an immediate poll of one device.
//! Each poll gets a bounded number of attempts; only transient transport failures
//! consume an attempt and are retried, anything else abandons the cycle. Failures never
//! reach other devices: every poll runs on its own task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ble::{BleTransport, DeviceLocks, close_session, open_session};
use crate::bus::{MessageBus, Topics};
use crate::config::PollerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{DeviceIdentity, DeviceRegistry};
use crate::service::{
    Event, EventPublisher, Service, ServiceContext, ServiceResult, ServiceSpec, kinds,
};
use crate::snapshot::TelemetrySnapshot;

pub const SERVICE_ID: &str = "poller";

/// Everything a poll task needs, shared between tasks
struct PollWorker {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn BleTransport>,
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    locks: DeviceLocks,
    max_attempts: u32,
    retry_delay: Duration,
    /// Devices with a scheduled poll in progress
    in_flight: DashSet<String>,
}

pub struct Poller {
    worker: Arc<PollWorker>,
    interval: Duration,
    tasks: JoinSet<()>,
}

impl Poller {
    pub fn new(
        config: &PollerConfig,
        registry: Arc<DeviceRegistry>,
        transport: Arc<dyn BleTransport>,
        bus: Arc<dyn MessageBus>,
        topics: Topics,
        locks: DeviceLocks,
    ) -> Self {
        Self {
            worker: Arc::new(PollWorker {
                registry,
                transport,
                bus,
                topics,
                locks,
                max_attempts: config.max_attempts.max(1),
                retry_delay: config.retry_delay,
                in_flight: DashSet::new(),
            }),
            interval: config.interval,
            tasks: JoinSet::new(),
        }
    }

    fn spawn_poll(&mut self, device: String, events: EventPublisher, scheduled: bool) {
        let worker = Arc::clone(&self.worker);
        self.tasks.spawn(async move {
            if scheduled && !worker.in_flight.insert(device.clone()) {
                debug!(device = %device, "Previous poll still running, skipping");
                return;
            }
            worker.poll_device(&device, &events).await;
            if scheduled {
                worker.in_flight.remove(&device);
            }
        });
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "Poll task panicked");
                }
            }
        }
    }
}

#[async_trait]
impl Service for Poller {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(SERVICE_ID, "Telemetry Poller")
            .with_tick_interval(self.interval)
            .subscribe(kinds::DEVICE_REFRESH)
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        info!(
            devices = self.worker.registry.len(),
            interval = ?self.interval,
            "Telemetry poller started"
        );
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        // Aborted tasks drop their sessions, which disconnects them
        self.tasks.shutdown().await;
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
        self.reap();
        for name in self.worker.registry.names() {
            self.spawn_poll(name, ctx.publisher(), true);
        }
        Ok(())
    }

    async fn on_event(&mut self, ctx: &ServiceContext, event: Event) -> ServiceResult<()> {
        self.reap();
        match event.device {
            Some(device) => {
                debug!(device = %device, source = %event.source, "Refresh requested");
                self.spawn_poll(device, ctx.publisher(), false);
            }
            None => warn!(source = %event.source, "Refresh event without a device"),
        }
        Ok(())
    }
}

impl PollWorker {
    async fn poll_device(&self, name: &str, events: &EventPublisher) {
        let device = match self.registry.resolve(name) {
            Ok(d) => d,
            Err(e) => {
                warn!(device = name, error = %e, "Cannot poll");
                return;
            }
        };

        let mut attempt = 1;
        let outcome = loop {
            match self.poll_once(device).await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        device = name,
                        attempt,
                        error = %e,
                        "Poll failed, retrying in {:?}",
                        self.retry_delay
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => break other,
            }
        };

        match outcome {
            Ok(()) => {
                debug!(device = name, attempt, "Telemetry published");
                events.emit(
                    kinds::TELEMETRY_PUBLISHED,
                    SERVICE_ID,
                    Some(name),
                    json!({ "attempts": attempt }),
                );
            }
            Err(e) => {
                error!(device = name, attempt, error = %e, "Abandoning poll cycle");
                events.emit(
                    kinds::TELEMETRY_FAILED,
                    SERVICE_ID,
                    Some(name),
                    json!({ "attempts": attempt, "error": e.to_string() }),
                );
            }
        }
    }

    async fn poll_once(&self, device: &DeviceIdentity) -> BridgeResult<()> {
        let snapshot = {
            let _guard = self.locks.acquire(&device.name).await;
            let mut session = open_session(self.transport.as_ref(), device).await?;
            let result = TelemetrySnapshot::read(session.as_mut(), &device.name).await;
            close_session(session, &device.name).await;
            result?
        };

        let payload = snapshot
            .to_json()
            .map_err(|e| BridgeError::ProtocolInvariantViolation(e.to_string()))?;
        self.bus
            .publish(&self.topics.telemetry(&device.name), payload)
            .await?;
        Ok(())
    }
}
