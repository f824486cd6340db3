//! Service runtime
//!
//! The bridge runs as a handful of long-lived services (poller, dispatcher, command
//! listener, availability). Each runs on its own task under the [`ServiceManager`] and
//! reacts to:
//! - `on_start` / `on_stop` at the ends of its life
//! - `on_event` for internal events matching its subscriptions
//! - `on_tick` on its configured interval

mod event;
mod handle;
mod manager;

pub use event::*;
pub use handle::*;
pub use manager::*;

use std::time::Duration;

use async_trait::async_trait;

// ─────────────────────────────────────────────────────────────────────────────
// Service Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("service failed to start: {0}")]
    StartFailed(String),

    #[error("service already running: {0}")]
    AlreadyRunning(String),

    #[error("service not running: {0}")]
    NotRunning(String),

    #[error("shutdown timed out")]
    ShutdownTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// ─────────────────────────────────────────────────────────────────────────────
// Service Spec
// ─────────────────────────────────────────────────────────────────────────────

/// Identity and scheduling of a service
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub id: String,
    pub name: String,
    /// Period of `on_tick`; the first tick fires right after start
    pub tick_interval: Option<Duration>,
    /// Event kinds routed to `on_event` (`"device/refresh"`, `"command/*"`, `"*"`)
    pub subscriptions: Vec<String>,
    pub shutdown_timeout: Duration,
}

impl ServiceSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tick_interval: None,
            subscriptions: Vec::new(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn subscribe(mut self, pattern: impl Into<String>) -> Self {
        self.subscriptions.push(pattern.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn wants(&self, event: &Event) -> bool {
        self.subscriptions.iter().any(|p| event.matches(p))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Context
// ─────────────────────────────────────────────────────────────────────────────

/// Passed to every lifecycle hook
pub struct ServiceContext {
    pub service_id: String,
    publisher: EventPublisher,
}

impl ServiceContext {
    pub fn new(service_id: impl Into<String>, publisher: EventPublisher) -> Self {
        Self {
            service_id: service_id.into(),
            publisher,
        }
    }

    /// Publisher for background tasks spawned by the service
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Trait
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn spec(&self) -> ServiceSpec;

    /// An error here marks the service failed; it never enters its loop
    async fn on_start(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    /// Release resources and wait for background work
    async fn on_stop(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    async fn on_event(&mut self, _ctx: &ServiceContext, _event: Event) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = ServiceSpec::new("poller", "Telemetry Poller")
            .with_tick_interval(Duration::from_secs(300))
            .subscribe(kinds::DEVICE_REFRESH)
            .with_shutdown_timeout(Duration::from_secs(5));

        assert_eq!(spec.id, "poller");
        assert_eq!(spec.tick_interval, Some(Duration::from_secs(300)));
        assert_eq!(spec.subscriptions, vec!["device/refresh"]);
        assert_eq!(spec.shutdown_timeout, Duration::from_secs(5));

        assert!(spec.wants(&Event::new(kinds::DEVICE_REFRESH, "dispatcher")));
        assert!(!spec.wants(&Event::new(kinds::COMMAND_SUCCEEDED, "dispatcher")));
    }
}
