//! Monitoring and realtime-power histories
//!
//! Both are chunked characteristics: a date header followed by `(delta, value)` pairs
//! that walk backwards from the header.

use chrono::{Days, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::reader::Fields;
use crate::error::CodecResult;

/// Heating on/off ratio for one day, month or hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatioSample {
    pub timestamp: NaiveDateTime,
    pub ratio: u8,
}

/// Hourly floor/room temperature reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureSample {
    pub timestamp: NaiveDateTime,
    pub floor_temperature: f64,
    pub room_temperature: f64,
}

/// Decoded monitoring characteristic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringHistory {
    /// Day anchor of the 7-day block
    #[serde(skip)]
    pub anchor: NaiveDateTime,
    #[serde(rename = "onOffRatio7Days")]
    pub daily: Vec<RatioSample>,
    #[serde(rename = "onOffRatio12Months")]
    pub monthly: Vec<RatioSample>,
    #[serde(rename = "temperature24Hours7Days", skip_serializing_if = "Vec::is_empty")]
    pub temperatures: Vec<TemperatureSample>,
}

// Absolute offsets into the monitoring buffer
const DAY_HEADER: usize = 0;
const DAY_PAIRS: usize = 3;
const DAY_COUNT: usize = 8;
const MONTH_HEADER: usize = 19;
const MONTH_PAIRS: usize = 21;
const MONTH_COUNT: usize = 13;
const HOUR_HEADER: usize = 47;
const TEMPERATURE_GROUPS: usize = 51;
const TEMPERATURE_STRIDE: usize = 5;

/// Decode the monitoring characteristic
///
/// Layout: day/month/year header, 8 `(days back, ratio)` pairs, month/year header
/// (anchored to the last day of that month), 13 `(months back, ratio)` pairs, then an
/// optional hour/day/month/year header with `(hours back, floor, room)` groups.
pub fn decode_monitoring(bytes: &[u8]) -> CodecResult<MonitoringHistory> {
    let f = Fields::new("monitoring", bytes, HOUR_HEADER)?;

    let anchor = date(&f, f.u8(DAY_HEADER + 2)?, f.u8(DAY_HEADER + 1)?, f.u8(DAY_HEADER)?)?;
    let daily = (0..DAY_COUNT)
        .map(|n| -> CodecResult<RatioSample> {
            let at = DAY_PAIRS + n * 2;
            let delta = f.u8(at)?;
            let timestamp = anchor
                .checked_sub_days(Days::new(u64::from(delta)))
                .ok_or_else(|| f.malformed(format!("day delta {delta} underflows")))?;
            Ok(RatioSample {
                timestamp: midnight(timestamp),
                ratio: f.u8(at + 1)?,
            })
        })
        .collect::<CodecResult<Vec<_>>>()?;

    let month_anchor = last_day_of_month(&f, f.u8(MONTH_HEADER + 1)?, f.u8(MONTH_HEADER)?)?;
    let monthly = (0..MONTH_COUNT)
        .map(|n| -> CodecResult<RatioSample> {
            let at = MONTH_PAIRS + n * 2;
            let delta = f.u8(at)?;
            let timestamp = month_anchor
                .checked_sub_months(Months::new(u32::from(delta)))
                .ok_or_else(|| f.malformed(format!("month delta {delta} underflows")))?;
            Ok(RatioSample {
                timestamp: midnight(timestamp),
                ratio: f.u8(at + 1)?,
            })
        })
        .collect::<CodecResult<Vec<_>>>()?;

    let temperatures = if f.len() >= TEMPERATURE_GROUPS {
        decode_temperatures(&f)?
    } else {
        Vec::new()
    };

    Ok(MonitoringHistory {
        anchor: midnight(anchor),
        daily,
        monthly,
        temperatures,
    })
}

fn decode_temperatures(f: &Fields<'_>) -> CodecResult<Vec<TemperatureSample>> {
    let hour_anchor = hour_stamp(f, HOUR_HEADER)?;

    let mut samples = Vec::new();
    let mut at = TEMPERATURE_GROUPS;
    while at + TEMPERATURE_STRIDE <= f.len() {
        let delta = f.u8(at)?;
        samples.push(TemperatureSample {
            timestamp: hour_anchor - Duration::hours(i64::from(delta)),
            floor_temperature: f64::from(f.i16(at + 1)?) / 10.0,
            room_temperature: f64::from(f.i16(at + 3)?) / 10.0,
        });
        at += TEMPERATURE_STRIDE;
    }
    Ok(samples)
}

/// Decode the realtime-power characteristic: hour/day/month/year header followed by
/// `(hours back, ratio)` pairs. A trailing odd byte is ignored.
pub fn decode_realtime_power(bytes: &[u8]) -> CodecResult<Vec<RatioSample>> {
    let f = Fields::new("realtime power", bytes, 4)?;
    let anchor = hour_stamp(&f, 0)?;

    let mut samples = Vec::with_capacity((f.len() - 4) / 2);
    let mut at = 4;
    while at + 2 <= f.len() {
        let delta = f.u8(at)?;
        samples.push(RatioSample {
            timestamp: anchor - Duration::hours(i64::from(delta)),
            ratio: f.u8(at + 1)?,
        });
        at += 2;
    }
    Ok(samples)
}

/// hour, day, month, year(+2000) starting at `at`
fn hour_stamp(f: &Fields<'_>, at: usize) -> CodecResult<NaiveDateTime> {
    let hour = f.u8(at)?;
    date(f, f.u8(at + 3)?, f.u8(at + 2)?, f.u8(at + 1)?)?
        .and_hms_opt(u32::from(hour), 0, 0)
        .ok_or_else(|| f.malformed(format!("invalid hour {hour}")))
}

fn date(f: &Fields<'_>, year: u8, month: u8, day: u8) -> CodecResult<NaiveDate> {
    NaiveDate::from_ymd_opt(2000 + i32::from(year), u32::from(month), u32::from(day))
        .ok_or_else(|| f.malformed(format!("invalid date {year:02}-{month:02}-{day:02}")))
}

fn last_day_of_month(f: &Fields<'_>, year: u8, month: u8) -> CodecResult<NaiveDate> {
    let first = date(f, year, month, 1)?;
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| f.malformed(format!("month {year:02}-{month:02} out of range")))
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}
