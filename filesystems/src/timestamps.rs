// On-disk timestamp conversion
// All results are UTC; a zero timestamp means "never set" and maps to None

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Seconds between 1904-01-01 (classic Mac OS epoch) and 1970-01-01
pub const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Days between 1970-01-01 and 1978-01-01 (AmigaDOS epoch)
pub const AMIGA_EPOCH_DAYS: i64 = 2922;

pub const AMIGA_TICKS_PER_SECOND: i64 = 50;

/// Seconds since 1904-01-01. HFS stores local time, HFS+ stores GMT;
/// both are reported as UTC.
pub fn from_mac(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    Utc.timestamp_opt(seconds as i64 - MAC_EPOCH_OFFSET, 0).single()
}

/// AmigaDOS DateStamp: days since 1978-01-01, minutes past midnight and
/// ticks (1/50 s) past the minute
pub fn from_amiga(days: u32, minutes: u32, ticks: u32) -> Option<DateTime<Utc>> {
    if days == 0 && minutes == 0 && ticks == 0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1978, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let stamp = epoch
        .checked_add_signed(Duration::days(days as i64))?
        .checked_add_signed(Duration::minutes(minutes as i64))?
        .checked_add_signed(Duration::milliseconds(
            ticks as i64 * 1000 / AMIGA_TICKS_PER_SECOND,
        ))?;
    Some(Utc.from_utc_datetime(&stamp))
}
