//! Availability heartbeat: `online` to `<base>/<device>/available` for every device

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::bus::{MessageBus, Topics};
use crate::registry::DeviceRegistry;
use crate::service::{Service, ServiceContext, ServiceResult, ServiceSpec};

pub const SERVICE_ID: &str = "availability";
pub const ONLINE: &[u8] = b"online";

pub struct Availability {
    registry: Arc<DeviceRegistry>,
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    interval: Duration,
}

impl Availability {
    pub fn new(
        interval: Duration,
        registry: Arc<DeviceRegistry>,
        bus: Arc<dyn MessageBus>,
        topics: Topics,
    ) -> Self {
        Self {
            registry,
            bus,
            topics,
            interval,
        }
    }
}

#[async_trait]
impl Service for Availability {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(SERVICE_ID, "Availability").with_tick_interval(self.interval)
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        for device in self.registry.iter() {
            let topic = self.topics.availability(&device.name);
            match self.bus.publish(&topic, ONLINE.to_vec()).await {
                Ok(()) => debug!(device = %device.name, "Announced availability"),
                Err(e) => warn!(device = %device.name, error = %e, "Availability publish failed"),
            }
        }
        Ok(())
    }
}
