// Occurrence iterator for repeated temporal scopes

use chrono::{Duration, NaiveDateTime};

use super::{TimeValue, When};

// Longest stretch a cron mask is searched without a match before giving up.
// Four years and a day covers every satisfiable day-of-month/month pairing.
const CRON_SEARCH_HORIZON_DAYS: i64 = 4 * 365 + 1;

/// Lazy sequence of single-occurrence scopes produced by a repeated [`When`].
///
/// Each item starts at an absolute instant and carries the inner duration
/// and period. The sequence ends once an occurrence would fall after the
/// outer scope. Candidates lie on the grid `tzero + k * period`; a cron mask
/// is searched field by field.
#[derive(Debug, Clone)]
pub struct WhenIter {
    when: When,
    tzero: NaiveDateTime,
    next: Option<NaiveDateTime>,
    step: Duration,
}

impl WhenIter {
    pub(super) fn new(when: When, tzero: NaiveDateTime) -> Self {
        let step = when.period.unwrap_or_else(|| Duration::seconds(1));
        let mut t = tzero;

        // fast forward to the start of the scope
        let lag = when.sort_scope(TimeValue::At(t), tzero);
        if lag < 0.0 {
            let ahead = Duration::microseconds((-lag * 1_000_000.0).round() as i64);
            t = t.checked_add_signed(ahead).unwrap_or(t);
        }

        // scope markers resolve against the first candidate from here on
        WhenIter { when, tzero: t, next: Some(t), step }
    }

    fn past_scope(&self, t: NaiveDateTime) -> bool {
        self.when.sort_scope(TimeValue::At(t), self.tzero) > 0.0
    }

    // First grid point at or after `target`, counting from `t`.
    fn align(&self, t: NaiveDateTime, target: NaiveDateTime) -> Option<NaiveDateTime> {
        let behind = (target - t).num_microseconds()?;
        let step = self.step.num_microseconds()?.max(1);
        let steps = (behind + step - 1) / step;
        t.checked_add_signed(Duration::microseconds(steps.checked_mul(step)?))
    }
}

impl Iterator for WhenIter {
    type Item = When;

    fn next(&mut self) -> Option<When> {
        let search_started = self.next?;
        let horizon = search_started
            .checked_add_signed(Duration::days(CRON_SEARCH_HORIZON_DAYS))
            .unwrap_or(NaiveDateTime::MAX);
        loop {
            let t = self.next?;
            if self.past_scope(t) {
                self.next = None;
                return None;
            }
            if let Some(cron) = &self.when.crontab {
                match cron.next_match(t, horizon) {
                    None => {
                        tracing::warn!(when = %self.when, "cron mask never matches, ending iteration");
                        self.next = None;
                        return None;
                    }
                    Some(m) if m > t => {
                        // the match may fall between grid points
                        self.next = self.align(t, m).filter(|a| *a > t).or_else(|| t.checked_add_signed(self.step));
                        continue;
                    }
                    Some(_) => {}
                }
            }
            self.next = t.checked_add_signed(self.step);
            return Some(When::occurrence(t, self.when.inner_duration, self.when.inner_period));
        }
    }
}
