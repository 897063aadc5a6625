//! Temporal scopes.
//!
//! A [`When`] names the window a statement applies to: a start marker, an
//! optional end or duration, an optional period and, for repeated scopes, an
//! inner window applied at every occurrence plus an optional cron mask.

mod crontab;
mod iter;
pub mod time;

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use mplane_error::{ModelError, ModelResult};

pub use crontab::Crontab;
pub use iter::WhenIter;
pub use time::{parse_duration, unparse_duration, utc_now, TimeValue};

use time::{duration_secs, TIME_NOW};

pub const RANGE_SEP: &str = " ... ";
pub const DURATION_SEP: &str = " + ";
pub const PERIOD_SEP: &str = " / ";
pub const WHEN_REPEAT: &str = "repeat ";
pub const WHEN_CRON: &str = " cron ";
const INNER_WHEN_START: &str = "{";
const INNER_WHEN_END: &str = "}";

/// A temporal scope. Immutable once built; the builder-style methods return
/// modified copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct When {
    a: TimeValue,
    b: Option<TimeValue>,
    duration: Option<Duration>,
    period: Option<Duration>,
    repeated: bool,
    inner_duration: Option<Duration>,
    inner_period: Option<Duration>,
    crontab: Option<Crontab>,
}

impl Default for When {
    fn default() -> Self {
        When::infinite()
    }
}

impl When {
    /// From the indeterminate past to the indeterminate future.
    pub fn infinite() -> Self {
        When::range(TimeValue::Past, TimeValue::Future)
    }

    /// A scope with only a start marker.
    pub fn starting(a: impl Into<TimeValue>) -> Self {
        When {
            a: a.into(),
            b: None,
            duration: None,
            period: None,
            repeated: false,
            inner_duration: None,
            inner_period: None,
            crontab: None,
        }
    }

    pub fn range(a: impl Into<TimeValue>, b: impl Into<TimeValue>) -> Self {
        When { b: Some(b.into()), ..When::starting(a) }
    }

    /// Set the duration, replacing any end marker.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.b = None;
        self.duration = Some(duration);
        self
    }

    pub fn with_period(mut self, period: Option<Duration>) -> Self {
        self.period = period;
        self
    }

    // Occurrence of a repeated scope: absolute start, inner window applied.
    fn occurrence(t: NaiveDateTime, duration: Option<Duration>, period: Option<Duration>) -> Self {
        When { duration, period, ..When::starting(t) }
    }

    pub fn start(&self) -> TimeValue {
        self.a
    }

    pub fn end(&self) -> Option<TimeValue> {
        self.b
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn inner_duration(&self) -> Option<Duration> {
        self.inner_duration
    }

    pub fn inner_period(&self) -> Option<Duration> {
        self.inner_period
    }

    pub fn crontab(&self) -> Option<&Crontab> {
        self.crontab.as_ref()
    }

    /// Starts now.
    pub fn is_immediate(&self) -> bool {
        self.a == TimeValue::Now
    }

    /// Ends in the indeterminate future.
    pub fn is_forever(&self) -> bool {
        self.b == Some(TimeValue::Future)
    }

    pub fn is_past(&self) -> bool {
        self.a == TimeValue::Past && self.b == Some(TimeValue::Now)
    }

    pub fn is_future(&self) -> bool {
        self.a == TimeValue::Now && self.b == Some(TimeValue::Future)
    }

    pub fn is_infinite(&self) -> bool {
        self.a == TimeValue::Past && self.b == Some(TimeValue::Future)
    }

    /// A definite instant or a definite interval; no sentinels.
    pub fn is_definite(&self) -> bool {
        let a_definite = matches!(self.a, TimeValue::At(_));
        match self.b {
            None => a_definite,
            Some(b) => a_definite && matches!(b, TimeValue::At(_)),
        }
    }

    /// A start with neither an end nor a duration: runs once, never interrupted.
    pub fn is_singleton(&self) -> bool {
        self.b.is_none() && self.duration.is_none()
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// Resolve the scope to absolute (start, end) instants relative to `tzero`.
    /// Unresolvable ends (past start, future end, or an end beyond the
    /// representable calendar) are `None`.
    pub fn datetimes(&self, tzero: NaiveDateTime) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let start = match self.a {
            TimeValue::Now => Some(tzero),
            TimeValue::At(t) => Some(t),
            TimeValue::Past | TimeValue::Future => None,
        };
        let end = match self.b {
            Some(TimeValue::Now) => Some(tzero),
            Some(TimeValue::At(t)) => Some(t),
            Some(TimeValue::Past) | Some(TimeValue::Future) => None,
            None => match self.duration {
                Some(d) => start.and_then(|s| s.checked_add_signed(d)),
                None => start,
            },
        };
        (start, end)
    }

    /// Length of the scope; `None` if it runs into the indeterminate future.
    pub fn duration(&self, tzero: NaiveDateTime) -> Option<Duration> {
        if let Some(d) = self.duration {
            return Some(d);
        }
        match self.b {
            None => Some(Duration::zero()),
            Some(TimeValue::Future) => None,
            Some(_) => match self.datetimes(tzero) {
                (Some(start), Some(end)) => Some(end - start),
                _ => None,
            },
        }
    }

    /// Delays until the scope starts and ends, measured from `tzero`.
    ///
    /// The start delay is zero for scopes that are immediate or already
    /// running. The end delay is `None` when the scope has no scheduled end.
    /// An expired scope yields `(None, None)` and must not be scheduled.
    pub fn timer_delays(&self, tzero: NaiveDateTime) -> (Option<Duration>, Option<Duration>) {
        let (start, end) = self.datetimes(tzero);

        let sd = start
            .map(|s| s - tzero)
            .filter(|d| *d > Duration::zero())
            .unwrap_or_else(Duration::zero);

        let ed = match self.b {
            Some(b) if b != TimeValue::Future => end.map(|e| e - tzero),
            _ if self.is_singleton() => None,
            _ => self.duration(tzero).and_then(|d| sd.checked_add(&d)),
        };

        match ed {
            Some(ed) if ed < Duration::zero() => (None, None),
            ed => (Some(sd), ed),
        }
    }

    /// Signed distance in seconds of `t` from the scope: negative before the
    /// start, positive after the end, zero inside.
    pub fn sort_scope(&self, t: TimeValue, tzero: NaiveDateTime) -> f64 {
        let t = match t {
            TimeValue::Now if self.a.is_now() || self.b.map_or(false, |b| b.is_now()) => return 0.0,
            TimeValue::Now => tzero,
            TimeValue::At(t) => t,
            TimeValue::Past => {
                return if self.datetimes(tzero).0.is_some() { f64::NEG_INFINITY } else { 0.0 };
            }
            TimeValue::Future => {
                return if self.datetimes(tzero).1.is_some() { f64::INFINITY } else { 0.0 };
            }
        };

        match self.datetimes(tzero) {
            (Some(start), _) if t < start => duration_secs(t - start),
            (_, Some(end)) if t > end => duration_secs(t - end),
            _ => 0.0,
        }
    }

    pub fn in_scope(&self, t: TimeValue, tzero: NaiveDateTime) -> bool {
        self.sort_scope(t, tzero) == 0.0
    }

    /// True if this scope is contained by `other`: its period is no coarser
    /// and its start (or absolute end) falls within `other`.
    pub fn follows(&self, other: &When, tzero: NaiveDateTime) -> bool {
        if let Some(outer) = other.period {
            let own = if self.repeated { self.inner_period } else { self.period };
            match own {
                Some(p) if p >= outer => {}
                _ => return false,
            }
        }
        if other.in_scope(self.a, tzero) {
            return true;
        }
        matches!(self.b, Some(b @ TimeValue::At(_)) if other.in_scope(b, tzero))
    }

    /// Iterate over the occurrences of a repeated scope, starting at `tzero`.
    pub fn iterator(&self, tzero: NaiveDateTime) -> ModelResult<WhenIter> {
        if !self.repeated {
            return Err(ModelError::NotRepeated(self.to_string()));
        }
        Ok(WhenIter::new(self.clone(), tzero))
    }
}

//-----------------------------------------------------------------------------
// Text form
//-----------------------------------------------------------------------------

// split on a separator that may appear at most once
fn split_once_strict<'a>(text: &'a str, sep: &str, whole: &str) -> ModelResult<Option<(&'a str, &'a str)>> {
    match text.split_once(sep) {
        Some((_, rest)) if rest.contains(sep) => {
            Err(ModelError::invalid_when(whole, format!("more than one {:?}", sep.trim())))
        }
        other => Ok(other),
    }
}

struct Inner {
    duration: Option<Duration>,
    period: Option<Duration>,
}

fn parse_inner(text: &str, whole: &str) -> ModelResult<Inner> {
    let text = text.trim();
    if !text.starts_with(TIME_NOW) {
        return Err(ModelError::invalid_when(whole, "inner when has to be relative to now"));
    }
    let (text, period) = match split_once_strict(text, PERIOD_SEP, whole)? {
        Some((head, per)) => (head, Some(parse_duration(per)?)),
        None => (text, None),
    };
    let (head, duration) = match split_once_strict(text, DURATION_SEP, whole)? {
        Some((head, dur)) => (head, Some(parse_duration(dur)?)),
        None => (text, None),
    };
    if head.trim() != TIME_NOW {
        return Err(ModelError::invalid_when(whole, "inner when has to be relative to now"));
    }
    Ok(Inner { duration, period })
}

impl FromStr for When {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        let mut when = When::starting(TimeValue::Past);
        let mut text = s.trim();

        if let Some(rest) = text.strip_prefix(WHEN_REPEAT) {
            when.repeated = true;
            text = rest;

            if let Some((outer, tail)) = text.split_once(INNER_WHEN_START) {
                let (inner, trailing) = tail
                    .split_once(INNER_WHEN_END)
                    .ok_or_else(|| ModelError::invalid_when(s, "unterminated inner when"))?;
                if !trailing.trim().is_empty() {
                    return Err(ModelError::invalid_when(s, "text after inner when"));
                }
                let inner = parse_inner(inner, s)?;
                when.inner_duration = inner.duration;
                when.inner_period = inner.period;
                text = outer.trim_end();
            }

            if let Some((outer, cron)) = split_once_strict(text, WHEN_CRON, s)? {
                when.crontab = Some(cron.parse()?);
                text = outer;
            }
        }

        if let Some((head, per)) = split_once_strict(text, PERIOD_SEP, s)? {
            when.period = Some(parse_duration(per)?);
            text = head;
        }

        if let Some((head, dur)) = split_once_strict(text, DURATION_SEP, s)? {
            when.duration = Some(parse_duration(dur)?);
            when.a = TimeValue::parse(head)?;
        } else if let Some((a, b)) = split_once_strict(text, RANGE_SEP, s)? {
            when.a = TimeValue::parse(a)?;
            when.b = Some(TimeValue::parse(b)?);
        } else {
            when.a = TimeValue::parse(text)?;
        }

        if when.repeated && when.crontab.is_none() && when.period.is_none() {
            return Err(ModelError::invalid_when(s, "repeated when needs a period or a cron"));
        }
        if when.repeated && when.crontab.is_some() && when.period.is_some() {
            return Err(ModelError::invalid_when(s, "repeated when cannot set both period and cron"));
        }
        Ok(when)
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repeated {
            f.write_str(WHEN_REPEAT)?;
        }
        write!(f, "{}", self.a)?;

        if let Some(b) = self.b {
            write!(f, "{RANGE_SEP}{b}")?;
        } else if let Some(d) = self.duration {
            write!(f, "{DURATION_SEP}{}", unparse_duration(d))?;
        }
        if let Some(p) = self.period {
            write!(f, "{PERIOD_SEP}{}", unparse_duration(p))?;
        }
        if let Some(cron) = &self.crontab {
            write!(f, "{WHEN_CRON}{cron}")?;
        }
        if self.inner_duration.is_some() || self.inner_period.is_some() {
            write!(f, " {INNER_WHEN_START} {TIME_NOW}")?;
            if let Some(d) = self.inner_duration {
                write!(f, "{DURATION_SEP}{}", unparse_duration(d))?;
            }
            if let Some(p) = self.inner_period {
                write!(f, "{PERIOD_SEP}{}", unparse_duration(p))?;
            }
            write!(f, " {INNER_WHEN_END}")?;
        }
        Ok(())
    }
}
