//! Device registry
//!
//! Identity records (name, MAC address, pairing key) for every paired thermostat. The
//! registry is built once at startup from the pairing directory and shared read-only
//! with the services.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};

// ─────────────────────────────────────────────────────────────────────────────
// MAC Address
// ─────────────────────────────────────────────────────────────────────────────

/// 6-byte BLE device address, displayed as upper-case colon-hex
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Parse 12 hex digits with no separators, as found in pairing file names
    pub fn from_compact(hex: &str) -> Option<Self> {
        if hex.len() != 12 || !hex.is_ascii() {
            return None;
        }
        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::Config(format!("invalid MAC address '{s}'"));
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to open an authorised session with one thermostat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub mac: MacAddress,
    /// Written to the pairing characteristic at the start of every session
    pub pairing_key: [u8; 4],
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, mac: MacAddress, pairing_key: [u8; 4]) -> Self {
        Self {
            name: name.into(),
            mac,
            pairing_key,
        }
    }
}

/// Normalise a user-facing device name into its topic form
///
/// Compatibility-decomposed (NFKD) so accented letters keep their base letter, then
/// anything still non-ASCII is dropped, the rest is lower-cased and spaces are removed.
pub fn normalize_name(raw: &str) -> String {
    raw.nfkd()
        .filter(|c| c.is_ascii() && *c != ' ')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Name-keyed set of device identities
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceIdentity>,
    /// Insertion order, so polling walks devices deterministically
    order: Vec<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity; a second record with the same name is rejected
    pub fn insert(&mut self, identity: DeviceIdentity) -> BridgeResult<()> {
        if self.devices.contains_key(&identity.name) {
            return Err(BridgeError::Config(format!(
                "duplicate device name '{}'",
                identity.name
            )));
        }
        self.order.push(identity.name.clone());
        self.devices.insert(identity.name.clone(), identity);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DeviceIdentity> {
        self.devices.get(name)
    }

    /// Look up a device, failing with `UnknownDevice`
    pub fn resolve(&self, name: &str) -> BridgeResult<&DeviceIdentity> {
        self.get(name)
            .ok_or_else(|| BridgeError::UnknownDevice(name.to_string()))
    }

    /// Devices in registration order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.order.iter().filter_map(|name| self.devices.get(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Load every `pairing-<mac>.json` in `dir`
    ///
    /// Unreadable or malformed files are logged and skipped, as are duplicate names
    /// (the first file wins).
    pub fn load_pairing_dir(dir: &Path) -> BridgeResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            BridgeError::Config(format!("cannot read pairing dir {}: {e}", dir.display()))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(mac) = pairing_file_mac(file_name) else {
                continue;
            };
            if mac == MacAddress::default() {
                debug!(file = file_name, "Skipping placeholder pairing file");
                continue;
            }

            match load_pairing_file(&path, mac) {
                Ok(identity) => {
                    let name = identity.name.clone();
                    if let Err(e) = registry.insert(identity) {
                        warn!(file = file_name, error = %e, "Ignoring pairing file");
                    } else {
                        info!(device = %name, %mac, "Registered device");
                    }
                }
                Err(e) => warn!(file = file_name, error = %e, "Skipping pairing file"),
            }
        }

        Ok(registry)
    }
}

/// On-disk pairing record written by the pairing flow
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairingFile {
    #[serde(alias = "resetKey")]
    reset_code: [u8; 4],
    device_name: String,
}

fn pairing_file_mac(file_name: &str) -> Option<MacAddress> {
    let hex = file_name.strip_prefix("pairing-")?.strip_suffix(".json")?;
    MacAddress::from_compact(hex)
}

fn load_pairing_file(path: &Path, mac: MacAddress) -> BridgeResult<DeviceIdentity> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("{}: {e}", path.display())))?;
    let record: PairingFile = serde_json::from_str(&text)
        .map_err(|e| BridgeError::Config(format!("{}: {e}", path.display())))?;

    let name = normalize_name(&record.device_name);
    if name.is_empty() {
        return Err(BridgeError::Config(format!(
            "{}: device name is empty after normalisation",
            path.display()
        )));
    }
    Ok(DeviceIdentity::new(name, mac, record.reset_code))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
