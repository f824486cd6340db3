//! Telemetry snapshot
//!
//! The full decoded state of one device, read in a single session. The read order is
//! fixed: the daylight-saving offset and device clock come first because the calendar
//! segments are anchored to the device's own wall clock.

use chrono::{DateTime, Utc};
use ecobridge_protocol::Characteristic;
use ecobridge_protocol::codec::{
    self, BoostState, CalendarSegment, DeviceInformation, MonitoringHistory, RatioSample,
    RealtimeState, VacationWindow,
};
use serde::Serialize;
use tracing::debug;

use crate::ble::{BleSession, read_chunked};
use crate::error::BridgeResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarSchedule {
    pub mode: u8,
    pub days: Vec<CalendarSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub information: DeviceInformation,
    pub realtime: RealtimeState,
    pub boost: BoostState,
    pub vacation: VacationWindow,
    pub calendar: CalendarSchedule,
    pub power: Vec<RatioSample>,
    #[serde(flatten)]
    pub monitoring: MonitoringHistory,
    /// When the bridge took the reading
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// Read and decode every characteristic through an authorised session
    pub async fn read(session: &mut dyn BleSession, device: &str) -> BridgeResult<Self> {
        let utc_offset = codec::decode_daylight_saving(
            &session.read(Characteristic::DaylightSaving).await?,
        )?;
        let now = codec::decode_date_time(&session.read(Characteristic::DateTime).await?, utc_offset)?;

        let realtime = codec::decode_realtime_state(&session.read(Characteristic::RealtimeState).await?)?;
        let boost = codec::decode_boost_state(&session.read(Characteristic::Boost).await?)?;

        let raw = read_chunked(session, Characteristic::Monitoring).await?;
        debug!(device, len = raw.len(), "Monitoring buffer");
        let monitoring = codec::decode_monitoring(&raw)?;

        let raw = read_chunked(session, Characteristic::RealtimePower).await?;
        debug!(device, len = raw.len(), "Realtime power buffer");
        let power = codec::decode_realtime_power(&raw)?;

        let calendar = CalendarSchedule {
            mode: codec::decode_calendar_mode(&session.read(Characteristic::CalendarMode).await?)?,
            days: codec::decode_calendar_day(&session.read(Characteristic::CalendarDay).await?, now)?,
        };
        let vacation = codec::decode_vacation(&session.read(Characteristic::VacationTime).await?)?;

        let information = DeviceInformation {
            name: device.to_string(),
            floor_area: codec::decode_floor_area(&session.read(Characteristic::FloorArea).await?)?,
            heating_power: codec::decode_heating_power(
                &session.read(Characteristic::HeatingPower).await?,
            )?,
            sensor: codec::decode_sensor_type(&session.read(Characteristic::SensorType).await?)?,
            adaptive: codec::decode_adaptive_control(
                &session.read(Characteristic::AdaptiveControl).await?,
            )?,
            temperature_limits: codec::decode_temperature_limits(
                &session.read(Characteristic::TemperatureLimits).await?,
            )?,
            datetime: now,
        };

        Ok(Self {
            information,
            realtime,
            boost,
            vacation,
            calendar,
            power,
            monitoring,
            timestamp: Utc::now(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
