//! Handle to a running service

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

use super::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl ServiceState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// Shared, lock-free view of a service's state
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ServiceState::Starting as u8)))
    }

    pub(crate) fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> ServiceState {
        ServiceState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Messages addressed to one service
pub enum ServiceCommand {
    /// Run `on_tick` now
    Tick,
    Shutdown,
}

/// Cloneable handle to a running service
#[derive(Clone)]
pub struct ServiceHandle {
    pub service_id: String,
    command_tx: mpsc::Sender<ServiceCommand>,
    state: StateCell,
}

impl ServiceHandle {
    pub(crate) fn new(
        service_id: String,
        command_tx: mpsc::Sender<ServiceCommand>,
        state: StateCell,
    ) -> Self {
        Self {
            service_id,
            command_tx,
            state,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    pub async fn tick(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::Tick).await
    }

    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::Shutdown).await
    }

    async fn send(&self, command: ServiceCommand) -> ServiceResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ServiceError::NotRunning(self.service_id.clone()))
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("service_id", &self.service_id)
            .field("state", &self.state())
            .finish()
    }
}
