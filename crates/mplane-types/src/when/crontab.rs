// Six-field cron masks for repeated temporal scopes

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use mplane_error::{ModelError, ModelResult};

const WILDCARD: &str = "*";

/// A cron mask over seconds, minutes, hours, day of month, weekday
/// (Sunday = 0) and month. An empty field matches every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crontab {
    seconds: BTreeSet<u32>,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days: BTreeSet<u32>,
    weekdays: BTreeSet<u32>,
    months: BTreeSet<u32>,
}

impl Crontab {
    /// True if every non-wildcard field contains the matching component of `t`.
    pub fn matches(&self, t: &NaiveDateTime) -> bool {
        allows(&self.seconds, t.second())
            && allows(&self.minutes, t.minute())
            && allows(&self.hours, t.hour())
            && allows(&self.days, t.day())
            && allows(&self.weekdays, t.weekday().num_days_from_sunday())
            && allows(&self.months, t.month())
    }

    /// The earliest instant at or after `from`, and not after `limit`, whose
    /// whole second matches the mask. `from` itself is returned when its
    /// second matches; later matches fall on a second boundary.
    pub fn next_match(&self, from: NaiveDateTime, limit: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.matches(&from) {
            return Some(from);
        }
        let mut t = from.with_nanosecond(0)?.checked_add_signed(Duration::seconds(1))?;
        while t <= limit {
            let (date, hour, minute, second) = (t.date(), t.hour(), t.minute(), t.second());
            t = if !allows(&self.months, date.month()) {
                first_of_next_month(date)?
            } else if !allows(&self.days, date.day())
                || !allows(&self.weekdays, date.weekday().num_days_from_sunday())
            {
                date.succ_opt()?.and_hms_opt(0, 0, 0)?
            } else if !allows(&self.hours, hour) {
                match self.hours.range(hour + 1..).next() {
                    Some(h) => date.and_hms_opt(*h, 0, 0)?,
                    None => date.succ_opt()?.and_hms_opt(0, 0, 0)?,
                }
            } else if !allows(&self.minutes, minute) {
                match self.minutes.range(minute + 1..).next() {
                    Some(m) => date.and_hms_opt(hour, *m, 0)?,
                    None => next_hour(date, hour)?,
                }
            } else if !allows(&self.seconds, second) {
                match self.seconds.range(second + 1..).next() {
                    Some(s) => date.and_hms_opt(hour, minute, *s)?,
                    None => next_minute(date, hour, minute)?,
                }
            } else {
                return Some(t);
            };
        }
        None
    }

    fn fields(&self) -> [&BTreeSet<u32>; 6] {
        [&self.seconds, &self.minutes, &self.hours, &self.days, &self.weekdays, &self.months]
    }
}

fn allows(set: &BTreeSet<u32>, v: u32) -> bool {
    set.is_empty() || set.contains(&v)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = match date.month() {
        12 => (date.year().checked_add(1)?, 1),
        m => (date.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn next_minute(date: NaiveDate, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    if minute < 59 {
        date.and_hms_opt(hour, minute + 1, 0)
    } else {
        next_hour(date, hour)
    }
}

fn next_hour(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    if hour < 23 {
        date.and_hms_opt(hour + 1, 0, 0)
    } else {
        date.succ_opt()?.and_hms_opt(0, 0, 0)
    }
}

fn parse_field(text: &str, low: u32, high: u32, whole: &str) -> ModelResult<BTreeSet<u32>> {
    let bad = |reason: &str| ModelError::invalid_when(whole, format!("cron field {text:?} {reason}"));
    if text == WILDCARD {
        return Ok(BTreeSet::new());
    }
    let number = |s: &str| s.trim().parse::<u32>().map_err(|_| bad("is not numeric"));

    let values: BTreeSet<u32> = match text.split_once('-') {
        Some((a, b)) => {
            let (a, b) = (number(a)?, number(b)?);
            if a > b {
                return Err(bad("has an empty range"));
            }
            (a..=b).collect()
        }
        None => text.split(',').map(number).collect::<ModelResult<_>>()?,
    };
    if values.iter().any(|v| *v < low || *v > high) {
        return Err(bad(&format!("is outside {low}-{high}")));
    }
    Ok(values)
}

impl FromStr for Crontab {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ModelError::invalid_when(s, "a crontab needs exactly six fields"));
        }
        Ok(Crontab {
            seconds: parse_field(fields[0], 0, 59, s)?,
            minutes: parse_field(fields[1], 0, 59, s)?,
            hours: parse_field(fields[2], 0, 23, s)?,
            days: parse_field(fields[3], 1, 31, s)?,
            weekdays: parse_field(fields[4], 0, 6, s)?,
            months: parse_field(fields[5], 1, 12, s)?,
        })
    }
}

impl fmt::Display for Crontab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .fields()
            .iter()
            .map(|set| {
                if set.is_empty() {
                    WILDCARD.to_string()
                } else {
                    set.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
                }
            })
            .collect();
        f.write_str(&rendered.join(" "))
    }
}
