use serde::Serialize;

use super::reader::Fields;
use crate::error::CodecResult;

const RECORD: &str = "realtime state";
const LEN: usize = 21;

// Device calibration constants
const TARGET_SCALE: f64 = 45.0 / 450.0;
const ROOM_SCALE: f64 = 40.0 / 400.0;
const FLOOR_SCALE: f64 = 55.0 / 550.0;

/// Realtime indication: temperatures, relay, modes and boost summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeState {
    #[serde(serialize_with = "super::rounded")]
    pub room_temperature: f64,
    #[serde(serialize_with = "super::rounded")]
    pub target_temperature: f64,
    #[serde(serialize_with = "super::rounded")]
    pub floor_temperature: f64,
    pub target_percent: u8,
    /// Heating relay energised
    #[serde(rename = "heat")]
    pub relay_on: bool,
    pub alarm_code: u32,
    pub active_mode: u8,
    pub heating_mode: u8,
    pub boost_enabled: bool,
    pub boost_setpoint_minutes: u16,
    pub boost_remaining_minutes: u16,
    pub potentiometer: u8,
}

/// Decode the realtime-state characteristic
///
/// The relay byte must be 0 or 1; any other value is rejected rather than coerced.
pub fn decode_realtime_state(bytes: &[u8]) -> CodecResult<RealtimeState> {
    let f = Fields::new(RECORD, bytes, LEN)?;

    let relay_on = match f.u8(8)? {
        0 => false,
        1 => true,
        other => return Err(f.malformed(format!("relay state {other} is neither 0 nor 1"))),
    };

    Ok(RealtimeState {
        target_temperature: f64::from(f.u16(1)?) * TARGET_SCALE,
        target_percent: f.u8(3)?,
        room_temperature: f64::from(f.i16(4)?) * ROOM_SCALE,
        floor_temperature: f64::from(f.i16(6)?) * FLOOR_SCALE,
        relay_on,
        alarm_code: f.u32(9)?,
        active_mode: f.u8(13)?,
        heating_mode: f.u8(14)?,
        boost_enabled: f.flag(15)?,
        boost_setpoint_minutes: f.u16(16)?,
        boost_remaining_minutes: f.u16(18)?,
        potentiometer: f.u8(20)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn sample(relay: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; LEN];
        bytes[1..3].copy_from_slice(&215u16.to_le_bytes()); // 21.5 target
        bytes[3] = 40;
        bytes[4..6].copy_from_slice(&203i16.to_le_bytes()); // 20.3 room
        bytes[6..8].copy_from_slice(&(-15i16).to_le_bytes()); // -1.5 floor
        bytes[8] = relay;
        bytes[9..13].copy_from_slice(&7u32.to_le_bytes());
        bytes[13] = 2;
        bytes[14] = 1;
        bytes[15] = 1;
        bytes[16..18].copy_from_slice(&60u16.to_le_bytes());
        bytes[18..20].copy_from_slice(&45u16.to_le_bytes());
        bytes[20] = 55;
        bytes
    }

    #[test]
    fn test_decode_fields() {
        let state = decode_realtime_state(&sample(1)).unwrap();
        assert!((state.target_temperature - 21.5).abs() < 1e-9);
        assert!((state.room_temperature - 20.3).abs() < 1e-9);
        assert!((state.floor_temperature + 1.5).abs() < 1e-9);
        assert_eq!(state.target_percent, 40);
        assert!(state.relay_on);
        assert_eq!(state.alarm_code, 7);
        assert_eq!(state.active_mode, 2);
        assert_eq!(state.heating_mode, 1);
        assert!(state.boost_enabled);
        assert_eq!(state.boost_setpoint_minutes, 60);
        assert_eq!(state.boost_remaining_minutes, 45);
        assert_eq!(state.potentiometer, 55);
    }

    #[test]
    fn test_relay_state_mapping() {
        assert!(!decode_realtime_state(&sample(0)).unwrap().relay_on);
        assert!(decode_realtime_state(&sample(1)).unwrap().relay_on);
        for value in [2u8, 0x40, 0xff] {
            assert!(matches!(
                decode_realtime_state(&sample(value)),
                Err(CodecError::MalformedPayload { .. })
            ));
        }
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            decode_realtime_state(&[0u8; 20]).unwrap_err(),
            CodecError::TooShort { record: RECORD, needed: 21, actual: 20 }
        );
    }

    #[test]
    fn test_json_is_rounded() {
        let json = serde_json::to_value(decode_realtime_state(&sample(0)).unwrap()).unwrap();
        assert_eq!(json["roomTemperature"], 20.3);
        assert_eq!(json["targetTemperature"], 21.5);
        assert_eq!(json["floorTemperature"], -1.5);
        assert_eq!(json["heat"], false);
        assert_eq!(json["boostSetpointMinutes"], 60);
    }
}
