use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};

/// Written in place of a deadline for tasks that have none.
pub const NO_DEADLINE: &str = "no deadline";
/// Sentinel written by older data files.
pub const LEGACY_NO_DEADLINE: &str = "无截止日期";

pub const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MONTH_FORMAT: &str = "%Y-%m";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized date/time value: {value:?}")]
pub struct ParseError {
    pub value: String,
}

impl ParseError {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

pub fn is_no_deadline(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw == NO_DEADLINE || raw == LEGACY_NO_DEADLINE
}

/// Parses a stored deadline. Date-only values resolve to midnight.
pub fn parse_deadline(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let value = raw.trim();
    for format in [DEADLINE_FORMAT, TIMESTAMP_FORMAT] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map(|date| date.and_time(NaiveTime::default()))
        .map_err(|_| ParseError::new(raw))
}

/// Parses a `create_time`/`done_time` value, falling back to the deadline formats.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .or_else(|_| parse_deadline(raw))
        .map_err(|_| ParseError::new(raw))
}

pub fn format_deadline(at: NaiveDateTime) -> String {
    at.format(DEADLINE_FORMAT).to_string()
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Signed distance from `now` to `deadline` in fractional days, keeping sub-second precision.
pub fn days_between(now: NaiveDateTime, deadline: NaiveDateTime) -> f64 {
    let delta = deadline - now;
    let seconds = match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    };
    seconds / SECONDS_PER_DAY as f64
}

pub fn seconds_between(now: NaiveDateTime, deadline: NaiveDateTime) -> i64 {
    (deadline - now).num_seconds()
}

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Monday of the week holding `date`; dates before the first representable Monday stay put.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
