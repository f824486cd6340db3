use chrono::{DateTime, FixedOffset, NaiveDate};

use super::reader::Fields;
use crate::error::CodecResult;

/// Decode the device wall clock
///
/// `[0:2)` year, then month, day, hour, minute. Seconds are always zero. The result is
/// placed in the fixed UTC offset read from the daylight-saving characteristic.
pub fn decode_date_time(bytes: &[u8], utc_offset_minutes: i16) -> CodecResult<DateTime<FixedOffset>> {
    let f = Fields::new("date-time", bytes, 6)?;
    let year = i32::from(f.u16(0)?);
    let (month, day, hour, minute) = (f.u8(2)?, f.u8(3)?, f.u8(4)?, f.u8(5)?);

    let offset = FixedOffset::east_opt(i32::from(utc_offset_minutes) * 60)
        .ok_or_else(|| f.malformed(format!("utc offset {utc_offset_minutes} min out of range")))?;

    NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), 0))
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .ok_or_else(|| {
            f.malformed(format!(
                "invalid timestamp {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}"
            ))
        })
}

/// Decode the daylight-saving characteristic: the last two bytes are the signed UTC
/// offset in minutes
pub fn decode_daylight_saving(bytes: &[u8]) -> CodecResult<i16> {
    let f = Fields::new("daylight saving", bytes, 2)?;
    f.i16(f.len() - 2)
}
