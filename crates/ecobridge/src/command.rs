//! Inbound control commands
//!
//! Commands arrive as JSON on `<base>/<device>/set`. The `type` field selects the kind;
//! boost is the only kind the thermostat accepts.

use ecobridge_protocol::codec::{BoostCommand, offset_from_degrees};
use serde::Deserialize;

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundCommand {
    Boost(BoostRequest),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostRequest {
    pub boost_enabled: bool,
    /// Degrees, scaled by 100 for the device
    pub boost_offset_degrees: f64,
    pub boost_setpoint_minutes: u16,
}

impl InboundCommand {
    pub fn parse(payload: &[u8]) -> BridgeResult<Self> {
        serde_json::from_slice(payload).map_err(|e| BridgeError::InvalidCommand(e.to_string()))
    }

    /// The write this command turns into
    pub fn to_boost(&self) -> BridgeResult<BoostCommand> {
        match self {
            Self::Boost(request) => {
                let offset = offset_from_degrees(request.boost_offset_degrees).ok_or_else(|| {
                    BridgeError::InvalidCommand(format!(
                        "boost offset {} out of range",
                        request.boost_offset_degrees
                    ))
                })?;
                Ok(BoostCommand {
                    enabled: request.boost_enabled,
                    offset_centi_degrees: offset,
                    offset_percentage: 0,
                    setpoint_minutes: request.boost_setpoint_minutes,
                    remaining_minutes: 0,
                })
            }
        }
    }
}

/// A command waiting for, or being retried by, the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    pub device: String,
    pub command: BoostCommand,
    /// Attempts that ended in a transient failure
    pub attempts: u32,
}

impl QueuedCommand {
    pub fn new(device: impl Into<String>, command: BoostCommand) -> Self {
        Self {
            device: device.into(),
            command,
            attempts: 0,
        }
    }
}
