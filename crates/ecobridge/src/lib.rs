//! ecobridge
//!
//! Bridges ECO16BT floor-heating thermostats (BLE) to an MQTT bus. Four services share
//! an immutable device registry:
//! - [`poller::Poller`] reads full telemetry snapshots on a schedule
//! - [`listener::CommandListener`] queues inbound `set` commands
//! - [`dispatcher::Dispatcher`] applies queued commands one at a time with retry
//! - [`availability::Availability`] announces each device as online

pub mod availability;
pub mod ble;
pub mod bus;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod poller;
pub mod queue;
pub mod registry;
pub mod service;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{BridgeError, BridgeResult};
