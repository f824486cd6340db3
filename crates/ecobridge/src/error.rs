//! Bridge error taxonomy

use ecobridge_protocol::CodecError;
use thiserror::Error;

use crate::ble::TransportError;
use crate::bus::BusError;

/// Errors surfaced by the bridge services
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A characteristic value could not be decoded
    #[error("malformed payload: {0}")]
    MalformedPayload(CodecError),

    /// A command named a device the registry does not know
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Connection drop or timeout during a BLE operation
    #[error("transient transport failure: {0}")]
    TransientTransportFailure(#[source] TransportError),

    #[error("protocol invariant violated: {0}")]
    ProtocolInvariantViolation(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("command queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl BridgeError {
    /// Only transient transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientTransportFailure(_))
    }
}

impl From<CodecError> for BridgeError {
    fn from(e: CodecError) -> Self {
        if e.is_malformed_payload() {
            Self::MalformedPayload(e)
        } else {
            Self::ProtocolInvariantViolation(e.to_string())
        }
    }
}

impl From<TransportError> for BridgeError {
    fn from(e: TransportError) -> Self {
        if e.is_transient() {
            Self::TransientTransportFailure(e)
        } else {
            Self::ProtocolInvariantViolation(e.to_string())
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
