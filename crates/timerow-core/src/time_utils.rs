//! Timestamp parsing, formatting and time-of-day bucketing.
//!
//! Sensor exports carry naive local wall-clock times; no timezone conversion
//! is applied anywhere in the pipeline.

use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Result, TimerowError};

/// Timestamp pattern used by the raw sensor export (`DD-MM-YYYY HH:MM`).
pub const RAW_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";

/// `datetime` column pattern of the canonical dataset.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `time` column pattern of the canonical dataset.
pub const TIME_FORMAT: &str = "%H:%M:%S";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Parse a raw export timestamp such as `01-03-2024 08:15`.
pub fn parse_raw_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), RAW_TIMESTAMP_FORMAT).ok()
}

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT).ok()
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).ok()
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn format_time(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Check that `bucket` is a whole number of minutes within one day.
pub fn validate_bucket_size(bucket: Duration) -> Result<()> {
    let secs = bucket.as_secs();
    if secs == 0 || bucket.subsec_nanos() != 0 || secs % 60 != 0 || secs > SECONDS_PER_DAY {
        return Err(TimerowError::Config(format!(
            "bucket size must be a whole number of minutes between 1 and 1440, got {:?}",
            bucket
        )));
    }
    Ok(())
}

/// Round `time` down to the start of its bucket.
///
/// `bucket` must already have passed [`validate_bucket_size`].
pub fn floor_to_bucket(time: NaiveTime, bucket: Duration) -> NaiveTime {
    let bucket_secs = bucket.as_secs().max(1) as u32;
    let secs = time.num_seconds_from_midnight();
    let floored = secs - secs % bucket_secs;
    NaiveTime::from_num_seconds_from_midnight_opt(floored, 0).unwrap_or(time)
}
