// Timestamps, sentinels and durations in their mPlane text forms

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use mplane_error::{ModelError, ModelResult};

pub const TIME_PAST: &str = "past";
pub const TIME_NOW: &str = "now";
pub const TIME_FUTURE: &str = "future";

/// Days represented by the duration literal `inf`
pub const MAX_TIME_DAYS: i64 = 100_000;

const DURATION_INF: &str = "inf";
const DURATION_UNITS: [(i64, char); 4] = [(86_400, 'd'), (3_600, 'h'), (60, 'm'), (1, 's')];

const TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const TIME_UNPARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current UTC wall-clock time.
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// A point in time as it appears in a temporal scope: either an absolute UTC
/// instant or one of the relative sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeValue {
    Past,
    Now,
    Future,
    At(NaiveDateTime),
}

impl TimeValue {
    pub fn parse(text: &str) -> ModelResult<Self> {
        match text.trim() {
            TIME_PAST => Ok(TimeValue::Past),
            TIME_NOW => Ok(TimeValue::Now),
            TIME_FUTURE => Ok(TimeValue::Future),
            other => parse_datetime(other).map(TimeValue::At),
        }
    }

    pub fn is_now(&self) -> bool {
        matches!(self, TimeValue::Now)
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TimeValue::At(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Past => f.write_str(TIME_PAST),
            TimeValue::Now => f.write_str(TIME_NOW),
            TimeValue::Future => f.write_str(TIME_FUTURE),
            TimeValue::At(t) => write!(f, "{}", t.format(TIME_UNPARSE_FORMAT)),
        }
    }
}

impl From<NaiveDateTime> for TimeValue {
    fn from(t: NaiveDateTime) -> Self {
        TimeValue::At(t)
    }
}

// past sorts before every instant and future after; now has no fixed place
impl PartialOrd for TimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use TimeValue::*;
        match (self, other) {
            (Past, Past) | (Now, Now) | (Future, Future) => Some(Ordering::Equal),
            (Past, _) | (_, Future) => Some(Ordering::Less),
            (_, Past) | (Future, _) => Some(Ordering::Greater),
            (At(a), At(b)) => a.partial_cmp(b),
            (Now, At(_)) | (At(_), Now) => None,
        }
    }
}

/// Parse an absolute timestamp with day, minute, second or sub-second precision.
pub fn parse_datetime(text: &str) -> ModelResult<NaiveDateTime> {
    let text = text.trim();
    for format in TIME_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(t);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ModelError::InvalidTime(text.to_string()))
}

/// Parse a duration of the form `[Nd][Nh][Nm][Ns]`, or `inf`.
pub fn parse_duration(text: &str) -> ModelResult<Duration> {
    let text = text.trim();
    if text == DURATION_INF {
        return Ok(Duration::days(MAX_TIME_DAYS));
    }
    let invalid = || ModelError::InvalidDuration(text.to_string());
    if text.is_empty() {
        return Err(invalid());
    }

    let mut seconds: i64 = 0;
    let mut digits = String::new();
    // units must appear in d, h, m, s order, each at most once
    let mut next_unit = 0;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let pos = DURATION_UNITS[next_unit..]
            .iter()
            .position(|(_, label)| *label == c)
            .ok_or_else(invalid)?;
        if digits.is_empty() {
            return Err(invalid());
        }
        let (scale, _) = DURATION_UNITS[next_unit + pos];
        let count: i64 = digits.parse().map_err(|_| invalid())?;
        seconds = count
            .checked_mul(scale)
            .and_then(|s| seconds.checked_add(s))
            .ok_or_else(invalid)?;
        digits.clear();
        next_unit += pos + 1;
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Duration::try_seconds(seconds).ok_or_else(invalid)
}

/// Render a duration greedily in days, hours, minutes and seconds.
pub fn unparse_duration(duration: Duration) -> String {
    let mut remaining = duration.num_seconds().max(0);
    let mut out = String::new();
    for (scale, label) in DURATION_UNITS {
        if remaining >= scale {
            let count = remaining / scale;
            out.push_str(&count.to_string());
            out.push(label);
            remaining -= count * scale;
        }
    }
    if out.is_empty() {
        out.push_str("0s");
    }
    out
}

/// Signed seconds in a chrono duration, with microsecond resolution.
pub fn duration_secs(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => d.num_seconds() as f64,
    }
}
