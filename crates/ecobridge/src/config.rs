//! Configuration
//!
//! Built-in defaults, then an optional TOML file, then `ECOBRIDGE_`-prefixed environment
//! variables (`__` separates nesting levels, e.g. `ECOBRIDGE_MQTT__HOST`). Durations are
//! written in whole seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

pub const ENV_PREFIX: &str = "ECOBRIDGE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttConfig,
    pub ble: BleConfig,
    /// Directory holding `pairing-<mac>.json` files
    pub pairing_dir: PathBuf,
    pub poller: PollerConfig,
    pub dispatcher: DispatcherConfig,
    pub availability: AvailabilityConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            ble: BleConfig::default(),
            pairing_dir: PathBuf::from("./"),
            poller: PollerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            availability: AvailabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Prefix of every topic the bridge uses
    pub base_topic: String,
    #[serde(with = "secs")]
    pub keep_alive: Duration,
    #[serde(with = "secs")]
    pub reconnect_delay: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "ecobridge".to_string(),
            username: None,
            password: None,
            base_topic: "ECO16BT".to_string(),
            keep_alive: Duration::from_secs(45),
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Adapter name prefix such as `hci0`; the first adapter when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    #[serde(with = "secs")]
    pub scan_timeout: Duration,
    /// Issue a warm-up request after connecting so BlueZ completes the MTU exchange
    /// before chunked reads (btleplug cannot exchange the MTU directly)
    pub exchange_mtu: bool,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            connect_timeout: Duration::from_secs(15),
            scan_timeout: Duration::from_secs(10),
            exchange_mtu: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    #[serde(with = "secs")]
    pub interval: Duration,
    pub max_attempts: u32,
    #[serde(with = "secs")]
    pub retry_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_attempts: 3,
            retry_delay: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    #[serde(with = "secs")]
    pub backoff: Duration,
    /// Unset means retry transient failures until shutdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(10),
            max_attempts: None,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    #[serde(with = "secs")]
    pub interval: Duration,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
        }
    }
}

impl Settings {
    /// Defaults merged with `file` (if it exists) and the environment
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: &Figment) -> BridgeResult<Self> {
        let settings: Self = figment
            .extract()
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(file: &Path) -> BridgeResult<Self> {
        Self::from_figment(&Self::figment(file))
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.poller.max_attempts == 0 {
            return Err(BridgeError::Config("poller.max_attempts must be at least 1".into()));
        }
        if self.dispatcher.max_attempts == Some(0) {
            return Err(BridgeError::Config(
                "dispatcher.max_attempts must be at least 1".into(),
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(BridgeError::Config(
                "dispatcher.queue_capacity must be at least 1".into(),
            ));
        }
        if self.poller.interval.is_zero() || self.availability.interval.is_zero() {
            return Err(BridgeError::Config("intervals must be non-zero".into()));
        }
        if self.mqtt.base_topic.is_empty() || self.mqtt.base_topic.contains(['+', '#']) {
            return Err(BridgeError::Config(format!(
                "invalid base topic '{}'",
                self.mqtt.base_topic
            )));
        }
        Ok(())
    }
}

/// `Duration` as whole seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.path().join("missing.toml")));
        let settings = Settings::from_figment(&figment).unwrap();

        assert_eq!(settings.pairing_dir, PathBuf::from("./"));

        assert_eq!(settings.mqtt.base_topic, "ECO16BT");
        assert_eq!(settings.mqtt.keep_alive, Duration::from_secs(45));
        assert_eq!(settings.poller.max_attempts, 3);
        assert_eq!(settings.poller.retry_delay, Duration::from_secs(20));
        assert_eq!(settings.dispatcher.backoff, Duration::from_secs(10));
        assert_eq!(settings.dispatcher.max_attempts, None);
        assert_eq!(settings.availability.interval, Duration::from_secs(900));
        assert_eq!(settings.ble.connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobridge.toml");
        std::fs::write(
            &path,
            r#"
pairing_dir = "/var/lib/ecobridge"

[mqtt]
host = "broker.lan"
username = "bridge"
password = "secret"

[dispatcher]
backoff = 3
max_attempts = 5

[ble]
adapter = "hci1"
exchange_mtu = true
"#,
        )
        .unwrap();

        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(&path));
        let settings = Settings::from_figment(&figment).unwrap();

        assert_eq!(settings.mqtt.host, "broker.lan");
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(settings.pairing_dir, PathBuf::from("/var/lib/ecobridge"));
        assert_eq!(settings.dispatcher.backoff, Duration::from_secs(3));
        assert_eq!(settings.dispatcher.max_attempts, Some(5));
        assert_eq!(settings.dispatcher.queue_capacity, 64);
        assert_eq!(settings.ble.adapter.as_deref(), Some("hci1"));
        assert!(settings.ble.exchange_mtu);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobridge.toml");
        std::fs::write(&path, "[poller]\nmax_attempts = 0\n").unwrap();

        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(&path));
        assert!(matches!(
            Settings::from_figment(&figment),
            Err(BridgeError::Config(_))
        ));
    }
}
