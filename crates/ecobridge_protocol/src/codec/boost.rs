use serde::Serialize;

use super::reader::Fields;
use crate::error::CodecResult;

const RECORD: &str = "boost state";

/// Size of the boost characteristic value
pub const BOOST_PAYLOAD_LEN: usize = 8;

/// A boost request to write to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostCommand {
    pub enabled: bool,
    /// Offset in hundredths of a degree
    pub offset_centi_degrees: i16,
    pub offset_percentage: u8,
    pub setpoint_minutes: u16,
    pub remaining_minutes: u16,
}

impl BoostCommand {
    /// Encode into the 8-byte boost characteristic layout
    pub fn encode(&self) -> [u8; BOOST_PAYLOAD_LEN] {
        let mut out = [0u8; BOOST_PAYLOAD_LEN];
        out[0] = u8::from(self.enabled);
        out[1..3].copy_from_slice(&self.offset_centi_degrees.to_le_bytes());
        out[3] = self.offset_percentage;
        out[4..6].copy_from_slice(&self.setpoint_minutes.to_le_bytes());
        out[6..8].copy_from_slice(&self.remaining_minutes.to_le_bytes());
        out
    }
}

/// Convert whole/fractional degrees to the device's centi-degree offset
///
/// Returns `None` when the value is not finite or does not fit a signed 16-bit field.
pub fn offset_from_degrees(degrees: f64) -> Option<i16> {
    let centi = (degrees * 100.0).round();
    if centi.is_finite() && centi >= f64::from(i16::MIN) && centi <= f64::from(i16::MAX) {
        Some(centi as i16)
    } else {
        None
    }
}

/// Boost state as read back from the device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoostState {
    #[serde(rename = "boostEnabled")]
    pub enabled: bool,
    #[serde(rename = "boostOffsetDegrees")]
    pub offset_degrees: f64,
    #[serde(rename = "boostPercentage")]
    pub offset_percentage: u8,
    #[serde(rename = "boostSetpointMinutes")]
    pub setpoint_minutes: u16,
    #[serde(rename = "boostTimeMinutes")]
    pub time_minutes: u16,
}

/// Decode the boost characteristic
pub fn decode_boost_state(bytes: &[u8]) -> CodecResult<BoostState> {
    let f = Fields::new(RECORD, bytes, BOOST_PAYLOAD_LEN)?;
    Ok(BoostState {
        enabled: f.flag(0)?,
        offset_degrees: f64::from(f.i16(1)?) / 100.0,
        offset_percentage: f.u8(3)?,
        setpoint_minutes: f.u16(4)?,
        time_minutes: f.u16(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let command = BoostCommand {
            enabled: true,
            offset_centi_degrees: 250,
            offset_percentage: 0,
            setpoint_minutes: 30,
            remaining_minutes: 0,
        };
        assert_eq!(command.encode(), [0x01, 0xfa, 0x00, 0x00, 0x1e, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_negative_offset_encoding() {
        let command = BoostCommand {
            enabled: false,
            offset_centi_degrees: -150,
            offset_percentage: 10,
            setpoint_minutes: 0x0102,
            remaining_minutes: 0x0304,
        };
        assert_eq!(command.encode(), [0x00, 0x6a, 0xff, 0x0a, 0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn test_write_then_read_back() {
        for (enabled, degrees, setpoint) in [(true, 2.5, 30u16), (false, -1.25, 0), (true, 0.07, 600)] {
            let command = BoostCommand {
                enabled,
                offset_centi_degrees: offset_from_degrees(degrees).unwrap(),
                offset_percentage: 0,
                setpoint_minutes: setpoint,
                remaining_minutes: 0,
            };
            let state = decode_boost_state(&command.encode()).unwrap();
            assert_eq!(state.enabled, enabled);
            assert_eq!(state.setpoint_minutes, setpoint);
            assert!((state.offset_degrees - degrees).abs() <= 0.005);
        }
    }

    #[test]
    fn test_offset_from_degrees() {
        assert_eq!(offset_from_degrees(2.5), Some(250));
        assert_eq!(offset_from_degrees(0.29), Some(29));
        assert_eq!(offset_from_degrees(-3.0), Some(-300));
        assert_eq!(offset_from_degrees(400.0), None);
        assert_eq!(offset_from_degrees(f64::NAN), None);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(decode_boost_state(&[1, 2, 3]).unwrap_err().is_malformed_payload());
    }
}
