//! Installation settings: floor area, heating power, sensor, adaptive control, limits

use chrono::{DateTime, FixedOffset};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::reader::Fields;
use crate::error::CodecResult;

/// Floor sensor resistance class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorType {
    Ohm6k8 = 1,
    Ohm10k = 2,
    Ohm12k = 3,
    Ohm15k = 4,
    Ohm20k = 5,
    Ohm33k = 6,
    Ohm47k = 7,
}

impl SensorType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Ohm6k8),
            2 => Some(Self::Ohm10k),
            3 => Some(Self::Ohm12k),
            4 => Some(Self::Ohm15k),
            5 => Some(Self::Ohm20k),
            6 => Some(Self::Ohm33k),
            7 => Some(Self::Ohm47k),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Label as printed in the device documentation
    pub fn label(self) -> &'static str {
        match self {
            Self::Ohm6k8 => "6,8kOhm",
            Self::Ohm10k => "10kOhm",
            Self::Ohm12k => "12kOhm",
            Self::Ohm15k => "15kOhm",
            Self::Ohm20k => "20kOhm",
            Self::Ohm33k => "33kOhm",
            Self::Ohm47k => "47kOhm",
        }
    }
}

impl Serialize for SensorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SensorType", 2)?;
        s.serialize_field("sensorType", &self.code())?;
        s.serialize_field("sensorTypeName", self.label())?;
        s.end()
    }
}

/// Allowed floor temperature range in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureLimits {
    pub low: f64,
    pub high: f64,
}

/// Everything the information block of a snapshot carries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInformation {
    pub name: String,
    pub floor_area: i16,
    pub heating_power: i16,
    pub sensor: SensorType,
    pub adaptive: u8,
    pub temperature_limits: TemperatureLimits,
    /// Device wall clock at the time of the read
    pub datetime: DateTime<FixedOffset>,
}

/// Floor area in raw device units
pub fn decode_floor_area(bytes: &[u8]) -> CodecResult<i16> {
    Fields::new("floor area", bytes, 2)?.i16(0)
}

/// Heating power in raw device units
pub fn decode_heating_power(bytes: &[u8]) -> CodecResult<i16> {
    Fields::new("heating power", bytes, 2)?.i16(0)
}

pub fn decode_sensor_type(bytes: &[u8]) -> CodecResult<SensorType> {
    let f = Fields::new("sensor type", bytes, 1)?;
    let code = f.u8(0)?;
    SensorType::from_code(code).ok_or_else(|| f.malformed(format!("unknown sensor code {code}")))
}

pub fn decode_adaptive_control(bytes: &[u8]) -> CodecResult<u8> {
    Fields::new("adaptive control", bytes, 1)?.u8(0)
}

/// Low and high limits, hundredths of a degree
pub fn decode_temperature_limits(bytes: &[u8]) -> CodecResult<TemperatureLimits> {
    let f = Fields::new("temperature limits", bytes, 4)?;
    Ok(TemperatureLimits {
        low: f64::from(f.i16(0)?) / 100.0,
        high: f64::from(f.i16(2)?) / 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn test_sensor_type() {
        assert_eq!(decode_sensor_type(&[3]).unwrap().label(), "12kOhm");
        assert_eq!(decode_sensor_type(&[1]).unwrap().label(), "6,8kOhm");
        assert!(matches!(
            decode_sensor_type(&[9]),
            Err(CodecError::MalformedPayload { .. })
        ));
        assert!(decode_sensor_type(&[0]).is_err());
        assert!(decode_sensor_type(&[]).unwrap_err().is_malformed_payload());
    }

    #[test]
    fn test_sensor_json() {
        let json = serde_json::to_value(SensorType::Ohm47k).unwrap();
        assert_eq!(json, serde_json::json!({"sensorType": 7, "sensorTypeName": "47kOhm"}));
    }

    #[test]
    fn test_scalar_settings() {
        assert_eq!(decode_floor_area(&[0x0c, 0x00]).unwrap(), 12);
        assert_eq!(decode_heating_power(&[0xb0, 0x04]).unwrap(), 1200);
        assert_eq!(decode_adaptive_control(&[1]).unwrap(), 1);
        assert!(decode_floor_area(&[0x0c]).is_err());
    }

    #[test]
    fn test_temperature_limits() {
        let limits = decode_temperature_limits(&[0xf4, 0x01, 0xac, 0x0d]).unwrap();
        assert_eq!(limits, TemperatureLimits { low: 5.0, high: 35.0 });
        assert!(decode_temperature_limits(&[0, 0, 0]).is_err());
    }
}
