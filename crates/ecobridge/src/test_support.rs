//! Test doubles: a scripted BLE transport that records every call

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ecobridge_protocol::Characteristic;
use parking_lot::Mutex;

use crate::ble::{BleSession, BleTransport, TransportCapabilities, TransportError, TransportResult};
use crate::registry::{DeviceIdentity, DeviceRegistry, MacAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Connect(MacAddress),
    NegotiateMtu(MacAddress),
    Read(MacAddress, Characteristic),
    Write(MacAddress, Characteristic, Vec<u8>),
    Close(MacAddress),
    /// Session dropped without close
    Dropped(MacAddress),
}

pub(crate) fn living_room() -> DeviceIdentity {
    DeviceIdentity::new(
        "livingroom",
        MacAddress::new([0x90, 0x7b, 0xc6, 0x0a, 0x1f, 0x3e]),
        [0x11, 0x22, 0x33, 0x44],
    )
}

pub(crate) fn kitchen() -> DeviceIdentity {
    DeviceIdentity::new(
        "kitchen",
        MacAddress::new([0x90, 0x7b, 0xc6, 0x0a, 0x20, 0x01]),
        [0x55, 0x66, 0x77, 0x88],
    )
}

pub(crate) fn registry_of(devices: &[DeviceIdentity]) -> Arc<DeviceRegistry> {
    let mut registry = DeviceRegistry::new();
    for device in devices {
        registry.insert(device.clone()).unwrap();
    }
    Arc::new(registry)
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    /// Frames returned by successive reads within one session; the last one repeats
    values: HashMap<Characteristic, Vec<Vec<u8>>>,
    connect_failures: HashMap<MacAddress, u32>,
    read_failures: HashMap<(MacAddress, Characteristic), u32>,
    write_failures: HashMap<(MacAddress, Characteristic), u32>,
    read_delays: HashMap<Characteristic, Duration>,
    /// Absent from the GATT table: every read or write fails
    missing: HashSet<Characteristic>,
    /// Writes are acknowledged but do not change the stored value
    ignored_writes: HashSet<Characteristic>,
}

fn take_failure<K: Eq + std::hash::Hash>(failures: &mut HashMap<K, u32>, key: &K) -> bool {
    match failures.get_mut(key) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    script: Arc<Mutex<Script>>,
    capabilities: TransportCapabilities,
    connect_delay: Option<Duration>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Transport scripted with a complete, valid thermostat
    pub(crate) fn with_device_values() -> Self {
        let transport = Self::new();
        for (characteristic, frames) in device_values() {
            transport.set_frames(characteristic, frames);
        }
        transport
    }

    pub(crate) fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn set_frames(&self, characteristic: Characteristic, frames: Vec<Vec<u8>>) {
        self.script.lock().values.insert(characteristic, frames);
    }

    pub(crate) fn set_value(&self, characteristic: Characteristic, value: Vec<u8>) {
        self.set_frames(characteristic, vec![value]);
    }

    /// The next `times` connects to `mac` time out
    pub(crate) fn fail_connects(&self, mac: MacAddress, times: u32) {
        self.script.lock().connect_failures.insert(mac, times);
    }

    pub(crate) fn fail_reads(&self, mac: MacAddress, characteristic: Characteristic, times: u32) {
        self.script
            .lock()
            .read_failures
            .insert((mac, characteristic), times);
    }

    pub(crate) fn fail_writes(&self, mac: MacAddress, characteristic: Characteristic, times: u32) {
        self.script
            .lock()
            .write_failures
            .insert((mac, characteristic), times);
    }

    /// Reads of `characteristic` stall for `delay` before answering
    pub(crate) fn delay_reads(&self, characteristic: Characteristic, delay: Duration) {
        self.script.lock().read_delays.insert(characteristic, delay);
    }

    pub(crate) fn remove_characteristic(&self, characteristic: Characteristic) {
        self.script.lock().missing.insert(characteristic);
    }

    pub(crate) fn ignore_writes(&self, characteristic: Characteristic) {
        self.script.lock().ignored_writes.insert(characteristic);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub(crate) fn writes_to(&self, characteristic: Characteristic) -> Vec<(MacAddress, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(mac, c, value) if c == characteristic => Some((mac, value)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    async fn connect(&self, address: MacAddress) -> TransportResult<Box<dyn BleSession>> {
        self.script.lock().calls.push(Call::Connect(address));
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        let failed = take_failure(&mut self.script.lock().connect_failures, &address);
        if failed {
            return Err(TransportError::Timeout(format!("connect to {address}")));
        }
        Ok(Box::new(FakeSession {
            script: Arc::clone(&self.script),
            address,
            cursors: HashMap::new(),
            closed: false,
        }))
    }
}

struct FakeSession {
    script: Arc<Mutex<Script>>,
    address: MacAddress,
    cursors: HashMap<Characteristic, usize>,
    closed: bool,
}

#[async_trait]
impl BleSession for FakeSession {
    async fn read(&mut self, characteristic: Characteristic) -> TransportResult<Vec<u8>> {
        let delay = {
            let mut script = self.script.lock();
            script.calls.push(Call::Read(self.address, characteristic));
            script.read_delays.get(&characteristic).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        if script.missing.contains(&characteristic) {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        if take_failure(&mut script.read_failures, &(self.address, characteristic)) {
            return Err(TransportError::Disconnected);
        }

        let frames = script
            .values
            .get(&characteristic)
            .filter(|f| !f.is_empty())
            .ok_or(TransportError::CharacteristicNotFound(characteristic))?;
        let cursor = self.cursors.entry(characteristic).or_insert(0);
        let frame = frames[(*cursor).min(frames.len() - 1)].clone();
        *cursor += 1;
        Ok(frame)
    }

    async fn write(&mut self, characteristic: Characteristic, value: &[u8]) -> TransportResult<()> {
        let mut script = self.script.lock();
        script
            .calls
            .push(Call::Write(self.address, characteristic, value.to_vec()));
        if script.missing.contains(&characteristic) {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        if take_failure(&mut script.write_failures, &(self.address, characteristic)) {
            return Err(TransportError::Disconnected);
        }
        if characteristic == Characteristic::Boost && !script.ignored_writes.contains(&characteristic) {
            script.values.insert(characteristic, vec![value.to_vec()]);
        }
        Ok(())
    }

    async fn negotiate_mtu(&mut self) -> TransportResult<Option<u16>> {
        self.script.lock().calls.push(Call::NegotiateMtu(self.address));
        Ok(Some(247))
    }

    async fn close(mut self: Box<Self>) -> TransportResult<()> {
        self.closed = true;
        self.script.lock().calls.push(Call::Close(self.address));
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            self.script.lock().calls.push(Call::Dropped(self.address));
        }
    }
}

/// Raw values of a healthy thermostat whose clock reads 2024-06-15 12:30 +03:00
fn device_values() -> Vec<(Characteristic, Vec<Vec<u8>>)> {
    let mut realtime = vec![0u8; 21];
    realtime[1..3].copy_from_slice(&220u16.to_le_bytes());
    realtime[3] = 40;
    realtime[4..6].copy_from_slice(&215i16.to_le_bytes());
    realtime[6..8].copy_from_slice(&230i16.to_le_bytes());
    realtime[8] = 1;

    // day/month/year, 8 day pairs, month/year, 13 month pairs
    let mut monitoring = vec![15, 6, 24];
    for day in 0..8u8 {
        monitoring.extend([day, 10 + day]);
    }
    monitoring.extend([6, 24]);
    for month in 0..13u8 {
        monitoring.extend([month, 20 + month]);
    }
    let monitoring_frames = vec![
        [&[0x00][..], &monitoring[..20]].concat(),
        [&[0x00][..], &monitoring[20..40]].concat(),
        [&[0x40][..], &monitoring[40..]].concat(),
    ];

    vec![
        (Characteristic::DaylightSaving, vec![vec![0x00, 0x00, 0xb4, 0x00]]),
        (Characteristic::DateTime, vec![vec![0xe8, 0x07, 6, 15, 12, 30]]),
        (Characteristic::RealtimeState, vec![realtime]),
        (Characteristic::Boost, vec![vec![0; 8]]),
        (Characteristic::Monitoring, monitoring_frames),
        // A single frame; the device repeats it as the final chunk
        (
            Characteristic::RealtimePower,
            vec![vec![0x40, 12, 15, 6, 24, 0, 50, 1, 60]],
        ),
        (Characteristic::CalendarMode, vec![vec![1]]),
        (
            Characteristic::CalendarDay,
            vec![vec![0, 0, 6, 30, 8, 0, 0xc8, 0x00, 0, 0, 1]],
        ),
        (Characteristic::VacationTime, vec![vec![0; 15]]),
        (Characteristic::FloorArea, vec![vec![12, 0]]),
        (Characteristic::HeatingPower, vec![vec![0xb0, 0x04]]),
        (Characteristic::SensorType, vec![vec![3]]),
        (Characteristic::AdaptiveControl, vec![vec![1]]),
        (Characteristic::TemperatureLimits, vec![vec![0xf4, 0x01, 0xac, 0x0d]]),
    ]
}
