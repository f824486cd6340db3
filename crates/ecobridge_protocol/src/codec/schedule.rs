//! Calendar and vacation characteristics

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use super::reader::{Fields, round2};
use crate::error::CodecResult;

/// One programmed segment of the current calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSegment {
    #[serde(rename = "timestamp_from")]
    pub from: DateTime<FixedOffset>,
    #[serde(rename = "timestamp_to")]
    pub to: DateTime<FixedOffset>,
    pub offset_temperature: f64,
    pub offset_percent: f64,
    pub enabled: bool,
}

const CALENDAR_HEADER: usize = 2;
const SEGMENT_STRIDE: usize = 8;
/// A segment reads one byte past its stride (the enabled flag)
const SEGMENT_SPAN: usize = SEGMENT_STRIDE + 1;

/// Decode the calendar-day characteristic
///
/// Segments are anchored to `reference` (the device clock): only the hour and minute
/// are replaced. A read too short to hold the header is an empty program.
pub fn decode_calendar_day(
    bytes: &[u8],
    reference: DateTime<FixedOffset>,
) -> CodecResult<Vec<CalendarSegment>> {
    if bytes.len() < CALENDAR_HEADER {
        return Ok(Vec::new());
    }
    let f = Fields::new("calendar day", bytes, CALENDAR_HEADER)?;
    let at = |hour: u8, minute: u8| {
        reference
            .with_hour(u32::from(hour))
            .and_then(|t| t.with_minute(u32::from(minute)))
            .ok_or_else(|| f.malformed(format!("invalid time of day {hour:02}:{minute:02}")))
    };

    let mut segments = Vec::new();
    let mut i = CALENDAR_HEADER;
    while i + SEGMENT_SPAN <= f.len() {
        let percent = f.u8(i + 7)?;
        segments.push(CalendarSegment {
            from: at(f.u8(i)?, f.u8(i + 1)?)?,
            to: at(f.u8(i + 2)?, f.u8(i + 3)?)?,
            offset_temperature: f64::from(f.i16(i + 4)?) / 100.0,
            offset_percent: if percent > 0 {
                round2(f64::from(percent) / 255.0 * 100.0)
            } else {
                0.0
            },
            enabled: f.flag(i + 8)?,
        });
        i += SEGMENT_STRIDE;
    }

    Ok(segments)
}

/// Decode the calendar-mode characteristic (first byte)
pub fn decode_calendar_mode(bytes: &[u8]) -> CodecResult<u8> {
    Fields::new("calendar mode", bytes, 1)?.u8(0)
}

/// Vacation override window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationWindow {
    /// `None` when the device reports an unset (all-zero) timestamp
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
    pub offset_temperature: f64,
    pub enabled: bool,
    pub current_mode: u8,
}

/// Decode the vacation-time characteristic
pub fn decode_vacation(bytes: &[u8]) -> CodecResult<VacationWindow> {
    let f = Fields::new("vacation time", bytes, 15)?;
    Ok(VacationWindow {
        date_from: vacation_stamp(&f, 0)?,
        date_to: vacation_stamp(&f, 5)?,
        offset_temperature: f64::from(f.i16(10)?) / 100.0,
        enabled: f.flag(13)?,
        current_mode: f.u8(14)?,
    })
}

/// year(+2000), month, day, hour, minute
fn vacation_stamp(f: &Fields<'_>, at: usize) -> CodecResult<Option<NaiveDateTime>> {
    let raw = [f.u8(at)?, f.u8(at + 1)?, f.u8(at + 2)?, f.u8(at + 3)?, f.u8(at + 4)?];
    if raw == [0; 5] {
        return Ok(None);
    }
    let [year, month, day, hour, minute] = raw;
    NaiveDate::from_ymd_opt(2000 + i32::from(year), u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), 0))
        .map(Some)
        .ok_or_else(|| f.malformed(format!("invalid vacation timestamp {raw:?}")))
}
