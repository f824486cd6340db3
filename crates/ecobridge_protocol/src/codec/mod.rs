//! Characteristic payload codec
//!
//! Pure mapping between raw characteristic bytes and typed records. All multi-byte
//! fields are little-endian. Decoders fail with a malformed-payload error when the
//! input is shorter than the layout or a discriminator byte has no meaning; they never
//! retry or log.

mod boost;
mod clock;
mod history;
mod info;
mod reader;
mod realtime;
mod schedule;

pub use boost::{BOOST_PAYLOAD_LEN, BoostCommand, BoostState, decode_boost_state, offset_from_degrees};
pub use clock::{decode_date_time, decode_daylight_saving};
pub use history::{
    MonitoringHistory, RatioSample, TemperatureSample, decode_monitoring, decode_realtime_power,
};
pub use info::{
    DeviceInformation, SensorType, TemperatureLimits, decode_adaptive_control, decode_floor_area,
    decode_heating_power, decode_sensor_type, decode_temperature_limits,
};
pub use realtime::{RealtimeState, decode_realtime_state};
pub use schedule::{
    CalendarSegment, VacationWindow, decode_calendar_day, decode_calendar_mode, decode_vacation,
};

use serde::Serializer;

/// Serialize a float rounded to two decimals
pub(crate) fn rounded<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(reader::round2(*value))
}
