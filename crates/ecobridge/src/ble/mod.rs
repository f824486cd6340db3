//! BLE transport boundary
//!
//! The bridge talks to thermostats through [`BleTransport`] and [`BleSession`]. A session
//! is one exclusive connection: opened, authorised with the pairing key, used for a
//! bounded sequence of reads and writes, then closed. [`DeviceLocks`] keeps two sessions
//! to the same device from overlapping.

#[cfg(feature = "bluez")]
pub mod bluez;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ecobridge_protocol::{Characteristic, ChunkAssembler, ChunkStatus};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::registry::{DeviceIdentity, MacAddress};

// ─────────────────────────────────────────────────────────────────────────────
// Transport Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: MacAddress, reason: String },

    #[error("timed out during {0}")]
    Timeout(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("device {0} not found")]
    DeviceNotFound(MacAddress),

    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(Characteristic),

    #[error("adapter error: {0}")]
    Adapter(String),
}

impl TransportError {
    /// Faults that may clear on a later attempt
    ///
    /// A device out of range looks the same as a dropped connection. A missing
    /// characteristic or a broken adapter does not go away by retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::CharacteristicNotFound(_) | Self::Adapter(_)
        )
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

// ─────────────────────────────────────────────────────────────────────────────
// Transport Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Optional steps a transport needs, resolved once when it is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// Exchange the ATT MTU explicitly after connecting
    pub exchange_mtu: bool,
}

#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities::default()
    }

    /// Open an exclusive connection to `address`
    async fn connect(&self, address: MacAddress) -> TransportResult<Box<dyn BleSession>>;
}

/// One open connection
///
/// Implementations must release the link when dropped without [`close`](Self::close),
/// so a cancelled operation never leaves a device connected.
#[async_trait]
pub trait BleSession: Send {
    async fn read(&mut self, characteristic: Characteristic) -> TransportResult<Vec<u8>>;

    async fn write(&mut self, characteristic: Characteristic, value: &[u8]) -> TransportResult<()>;

    /// Negotiate the payload size; returns the agreed MTU when the stack reports one
    async fn negotiate_mtu(&mut self) -> TransportResult<Option<u16>> {
        Ok(None)
    }

    async fn close(self: Box<Self>) -> TransportResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Connect and authorise a session with `device`
///
/// The pairing write happens before anything else. If it fails the connection is
/// closed before the error is returned.
pub async fn open_session(
    transport: &dyn BleTransport,
    device: &DeviceIdentity,
) -> BridgeResult<Box<dyn BleSession>> {
    let mut session = transport.connect(device.mac).await?;

    let prepared = prepare(session.as_mut(), transport.capabilities(), device).await;
    if let Err(e) = prepared {
        close_session(session, &device.name).await;
        return Err(e);
    }
    Ok(session)
}

async fn prepare(
    session: &mut dyn BleSession,
    capabilities: TransportCapabilities,
    device: &DeviceIdentity,
) -> BridgeResult<()> {
    if capabilities.exchange_mtu {
        if let Some(mtu) = session.negotiate_mtu().await? {
            debug!(device = %device.name, mtu, "Negotiated MTU");
        }
    }
    session
        .write(Characteristic::Pairing, &device.pairing_key)
        .await?;
    Ok(())
}

/// Close a session, logging instead of failing
pub async fn close_session(session: Box<dyn BleSession>, device: &str) {
    if let Err(e) = session.close().await {
        warn!(device, error = %e, "Failed to close BLE session");
    }
}

/// Read a characteristic that spans several frames
///
/// A transport fault discards whatever was assembled so far.
pub async fn read_chunked(
    session: &mut dyn BleSession,
    characteristic: Characteristic,
) -> BridgeResult<Vec<u8>> {
    let mut assembler = ChunkAssembler::new();
    loop {
        let frame = session.read(characteristic).await?;
        if assembler.push(&frame)? == ChunkStatus::Complete {
            debug!(
                %characteristic,
                frames = assembler.frames(),
                "Chunked read complete"
            );
            return Ok(assembler.into_buffer());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device Locks
// ─────────────────────────────────────────────────────────────────────────────

/// One async mutex per device name, shared by every service that opens sessions
#[derive(Debug, Clone, Default)]
pub struct DeviceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other session to `device` is open
    pub async fn acquire(&self, device: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(device.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::test_support::{Call, FakeTransport, living_room};
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_session_pairs_first() {
        let transport = FakeTransport::new();
        let device = living_room();

        let session = open_session(&transport, &device).await.unwrap();
        close_session(session, &device.name).await;

        assert_eq!(
            transport.calls(),
            vec![
                Call::Connect(device.mac),
                Call::Write(device.mac, Characteristic::Pairing, vec![0x11, 0x22, 0x33, 0x44]),
                Call::Close(device.mac),
            ]
        );
    }

    #[tokio::test]
    async fn test_mtu_exchange_follows_capability() {
        let transport = FakeTransport::new().with_capabilities(TransportCapabilities {
            exchange_mtu: true,
        });
        let device = living_room();

        let session = open_session(&transport, &device).await.unwrap();
        close_session(session, &device.name).await;

        assert_eq!(transport.calls()[1], Call::NegotiateMtu(device.mac));
    }

    #[tokio::test]
    async fn test_failed_pairing_closes_session() {
        let transport = FakeTransport::new();
        let device = living_room();
        transport.fail_writes(device.mac, Characteristic::Pairing, 1);

        let err = open_session(&transport, &device).await.err().unwrap();
        assert!(err.is_retryable());
        assert_eq!(transport.calls().last(), Some(&Call::Close(device.mac)));
    }

    #[tokio::test]
    async fn test_read_chunked() {
        let transport = FakeTransport::new();
        transport.set_frames(
            Characteristic::Monitoring,
            vec![vec![0x00, 1, 2], vec![0x00, 3, 4], vec![0x40, 3, 4]],
        );
        let device = living_room();

        let mut session = open_session(&transport, &device).await.unwrap();
        let buffer = read_chunked(session.as_mut(), Characteristic::Monitoring)
            .await
            .unwrap();
        close_session(session, &device.name).await;

        assert_eq!(buffer, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_read_chunked_transport_fault() {
        let transport = FakeTransport::new();
        transport.set_frames(Characteristic::Monitoring, vec![vec![0x00, 1, 2]]);
        let device = living_room();
        transport.fail_reads(device.mac, Characteristic::Monitoring, 1);

        let mut session = open_session(&transport, &device).await.unwrap();
        let err = read_chunked(session.as_mut(), Characteristic::Monitoring)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TransientTransportFailure(_)));
    }

    #[tokio::test]
    async fn test_device_locks_serialise_sessions() {
        let locks = DeviceLocks::new();
        let guard = locks.acquire("livingroom").await;

        // A different device is not blocked
        let _other = locks.acquire("kitchen").await;

        let waiting = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("livingroom").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }
}
