//! btleplug transport
//!
//! Scans the configured adapter for the target address, connects with a timeout,
//! discovers services and resolves characteristics by UUID. Reads and writes go through
//! with response.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic as GattCharacteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use ecobridge_protocol::Characteristic;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BleSession, BleTransport, TransportCapabilities, TransportError, TransportResult};
use crate::config::BleConfig;
use crate::registry::MacAddress;

const SCAN_POLL: Duration = Duration::from_millis(250);

fn map_err(e: btleplug::Error) -> TransportError {
    match e {
        btleplug::Error::TimedOut(d) => TransportError::Timeout(format!("{d:?}")),
        btleplug::Error::NotConnected => TransportError::Disconnected,
        btleplug::Error::PermissionDenied => {
            TransportError::Adapter("permission denied".to_string())
        }
        other => TransportError::Io(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

pub struct BluezTransport {
    adapter: Adapter,
    connect_timeout: Duration,
    scan_timeout: Duration,
    capabilities: TransportCapabilities,
}

impl BluezTransport {
    /// Open the adapter named in `config`, or the first one available
    pub async fn new(config: &BleConfig) -> TransportResult<Self> {
        let manager = Manager::new().await.map_err(map_err)?;
        let adapters = manager.adapters().await.map_err(map_err)?;

        let mut selected = None;
        for adapter in adapters {
            let info = adapter.adapter_info().await.map_err(map_err)?;
            let wanted = config
                .adapter
                .as_deref()
                .map(|name| info.starts_with(name))
                .unwrap_or(true);
            if wanted {
                info!(adapter = %info, "Using BLE adapter");
                selected = Some(adapter);
                break;
            }
        }

        let adapter = selected.ok_or_else(|| {
            TransportError::Adapter(match &config.adapter {
                Some(name) => format!("adapter '{name}' not found"),
                None => "no BLE adapter available".to_string(),
            })
        })?;

        Ok(Self {
            adapter,
            connect_timeout: config.connect_timeout,
            scan_timeout: config.scan_timeout,
            capabilities: TransportCapabilities {
                exchange_mtu: config.exchange_mtu,
            },
        })
    }

    async fn find(&self, address: MacAddress) -> TransportResult<Peripheral> {
        if let Some(p) = self.known(address).await? {
            return Ok(p);
        }

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(map_err)?;

        let deadline = Instant::now() + self.scan_timeout;
        let found = loop {
            if let Some(p) = self.known(address).await? {
                break Some(p);
            }
            if Instant::now() >= deadline {
                break None;
            }
            sleep(SCAN_POLL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            debug!(error = %e, "Failed to stop scan");
        }
        found.ok_or(TransportError::DeviceNotFound(address))
    }

    async fn known(&self, address: MacAddress) -> TransportResult<Option<Peripheral>> {
        let peripherals = self.adapter.peripherals().await.map_err(map_err)?;
        Ok(peripherals
            .into_iter()
            .find(|p| p.address().into_inner() == address.octets()))
    }
}

#[async_trait]
impl BleTransport for BluezTransport {
    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    async fn connect(&self, address: MacAddress) -> TransportResult<Box<dyn BleSession>> {
        let peripheral = self.find(address).await?;

        match timeout(self.connect_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(TransportError::Connect {
                    address,
                    reason: e.to_string(),
                });
            }
            Err(_) => return Err(TransportError::Timeout(format!("connect to {address}"))),
        }

        // From here on the session owns the link and disconnects on drop
        let mut session = BluezSession {
            peripheral,
            address,
            characteristics: HashMap::new(),
            closed: false,
        };
        session.discover().await?;
        debug!(%address, "Connected");
        Ok(Box::new(session))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

struct BluezSession {
    peripheral: Peripheral,
    address: MacAddress,
    characteristics: HashMap<Uuid, GattCharacteristic>,
    closed: bool,
}

impl BluezSession {
    async fn discover(&mut self) -> TransportResult<()> {
        self.peripheral.discover_services().await.map_err(map_err)?;
        self.characteristics = self
            .peripheral
            .characteristics()
            .into_iter()
            .map(|c| (c.uuid, c))
            .collect();
        Ok(())
    }

    fn lookup(&self, characteristic: Characteristic) -> TransportResult<&GattCharacteristic> {
        self.characteristics
            .get(&characteristic.uuid())
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }
}

#[async_trait]
impl BleSession for BluezSession {
    async fn read(&mut self, characteristic: Characteristic) -> TransportResult<Vec<u8>> {
        let target = self.lookup(characteristic)?;
        self.peripheral.read(target).await.map_err(map_err)
    }

    async fn write(&mut self, characteristic: Characteristic, value: &[u8]) -> TransportResult<()> {
        let target = self.lookup(characteristic)?;
        self.peripheral
            .write(target, value, WriteType::WithResponse)
            .await
            .map_err(map_err)
    }

    /// btleplug has no MTU exchange call and does not report the negotiated size, so this
    /// never returns a value. BlueZ runs the ATT exchange itself on the first request after
    /// connecting; reading the GAP name here only makes sure that happens before the
    /// chunked reads.
    async fn negotiate_mtu(&mut self) -> TransportResult<Option<u16>> {
        let name = self.lookup(Characteristic::DeviceName)?;
        self.peripheral.read(name).await.map_err(map_err)?;
        Ok(None)
    }

    async fn close(mut self: Box<Self>) -> TransportResult<()> {
        self.closed = true;
        self.peripheral.disconnect().await.map_err(map_err)
    }
}

impl Drop for BluezSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let peripheral = self.peripheral.clone();
        let address = self.address;
        runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!(%address, error = %e, "Disconnect after cancelled session failed");
            }
        });
    }
}
