//! Service manager
//!
//! Spawns each service on its own task, routes internal events by subscription and
//! drives graceful shutdown.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    Event, EventPublisher, Service, ServiceCommand, ServiceContext, ServiceError, ServiceHandle,
    ServiceResult, ServiceSpec, ServiceState, StateCell,
};

const EVENT_CAPACITY: usize = 1024;
const COMMAND_CAPACITY: usize = 64;

struct RunningService {
    handle: ServiceHandle,
    task: JoinHandle<ServiceResult<()>>,
    shutdown_timeout: Duration,
}

pub struct ServiceManager {
    services: DashMap<String, RunningService>,
    shutdown_tx: broadcast::Sender<()>,
    events: EventPublisher,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            services: DashMap::new(),
            shutdown_tx,
            events: EventPublisher::new(event_tx),
        }
    }

    pub fn event_publisher(&self) -> EventPublisher {
        self.events.clone()
    }

    /// Observe every internal event
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn spawn<S: Service>(&self, service: S) -> ServiceResult<ServiceHandle> {
        let spec = service.spec();
        let id = spec.id.clone();
        if self.services.contains_key(&id) {
            return Err(ServiceError::AlreadyRunning(id));
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let state = StateCell::new();
        let handle = ServiceHandle::new(id.clone(), command_tx, state.clone());

        let ctx = ServiceContext::new(id.clone(), self.event_publisher());
        let shutdown_rx = self.shutdown_tx.subscribe();
        let event_rx = self.events.subscribe();
        let shutdown_timeout = spec.shutdown_timeout;

        let task = tokio::spawn(run_service(
            service,
            spec,
            ctx,
            command_rx,
            shutdown_rx,
            event_rx,
            state,
        ));

        self.services.insert(
            id,
            RunningService {
                handle: handle.clone(),
                task,
                shutdown_timeout,
            },
        );
        Ok(handle)
    }

    pub fn emit(&self, kind: &str, source: &str, device: Option<&str>, data: serde_json::Value) {
        self.events.emit(kind, source, device, data);
    }

    /// Stop one service and wait for its task
    pub async fn stop(&self, service_id: &str) -> ServiceResult<()> {
        let (_, running) = self
            .services
            .remove(service_id)
            .ok_or_else(|| ServiceError::NotRunning(service_id.to_string()))?;

        let _ = running.handle.shutdown().await;
        join(service_id, running.task, running.shutdown_timeout).await
    }

    /// Signal every service and wait for all of them
    pub async fn shutdown_all(&self) -> ServiceResult<()> {
        info!(services = self.services.len(), "Shutting down services");
        let _ = self.shutdown_tx.send(());

        let ids: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        let stopping = ids
            .into_iter()
            .filter_map(|id| self.services.remove(&id))
            .map(|(id, running)| async move {
                join(&id, running.task, running.shutdown_timeout).await
            });

        futures::future::join_all(stopping)
            .await
            .into_iter()
            .collect::<ServiceResult<Vec<()>>>()
            .map(|_| ())
    }

    pub fn list(&self) -> Vec<(String, ServiceState)> {
        self.services
            .iter()
            .map(|e| (e.key().clone(), e.value().handle.state()))
            .collect()
    }
}

async fn join(
    service_id: &str,
    task: JoinHandle<ServiceResult<()>>,
    timeout: Duration,
) -> ServiceResult<()> {
    // The loop already bounds on_stop; allow a little slack on top
    match tokio::time::timeout(timeout + Duration::from_secs(1), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!(service_id, error = %e, "Service task panicked");
            Err(ServiceError::Internal(format!("task panicked: {e}")))
        }
        Err(_) => {
            warn!(service_id, "Service shutdown timed out");
            Err(ServiceError::ShutdownTimeout)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_service<S: Service>(
    mut service: S,
    spec: ServiceSpec,
    ctx: ServiceContext,
    mut command_rx: mpsc::Receiver<ServiceCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut event_rx: broadcast::Receiver<Event>,
    state: StateCell,
) -> ServiceResult<()> {
    let id = ctx.service_id.clone();

    if let Err(e) = service.on_start(&ctx).await {
        error!(service_id = %id, error = %e, "Service failed to start");
        state.set(ServiceState::Failed);
        return Err(e);
    }
    state.set(ServiceState::Running);
    info!(service_id = %id, "Service started");

    let mut ticker = spec.tick_interval.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(service_id = %id, "Global shutdown");
                break;
            }

            command = command_rx.recv() => match command {
                Some(ServiceCommand::Tick) => {
                    if let Err(e) = service.on_tick(&ctx).await {
                        warn!(service_id = %id, error = %e, "Error during tick");
                    }
                }
                Some(ServiceCommand::Shutdown) | None => break,
            },

            received = event_rx.recv() => match received {
                Ok(event) if spec.wants(&event) => {
                    if let Err(e) = service.on_event(&ctx, event).await {
                        warn!(service_id = %id, error = %e, "Error handling event");
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(service_id = %id, missed, "Event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = async {
                match ticker.as_mut() {
                    Some(t) => t.tick().await,
                    None => std::future::pending().await,
                }
            } => {
                if let Err(e) = service.on_tick(&ctx).await {
                    warn!(service_id = %id, error = %e, "Error during tick");
                }
            }
        }
    }

    state.set(ServiceState::Stopping);
    debug!(service_id = %id, "Service stopping");

    match tokio::time::timeout(spec.shutdown_timeout, service.on_stop(&ctx)).await {
        Ok(Ok(())) => {
            state.set(ServiceState::Stopped);
            info!(service_id = %id, "Service stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            state.set(ServiceState::Failed);
            error!(service_id = %id, error = %e, "Service stop failed");
            Err(e)
        }
        Err(_) => {
            state.set(ServiceState::Failed);
            error!(service_id = %id, "Service stop timed out");
            Err(ServiceError::ShutdownTimeout)
        }
    }
}
