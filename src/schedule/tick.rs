//! Tick bookkeeping on top of the boundary arithmetic.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use super::align::{aligned_boundary, delay_to_next_boundary, Period, MIN_DELAY};

/// Chooses the boundary each tick is attributed to.
///
/// A tick is labelled with the largest boundary at or before the instant it
/// samples. A wake-up landing less than [`MIN_DELAY`] short of its target
/// counts as that target, so a timer firing a few milliseconds early still
/// labels the right slot. Boundaries are strictly increasing even if the wall
/// clock steps backwards.
#[derive(Debug, Clone)]
pub struct Schedule {
    period: Period,
    last: Option<DateTime<FixedOffset>>,
}

impl Schedule {
    pub fn new(period: Period) -> Self {
        Self { period, last: None }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// The next boundary to wake at, given the current time.
    pub fn next_target(&self, now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let delay = delay_to_next_boundary(now, self.period);
        let landing = *now + chrono::TimeDelta::from_std(delay).unwrap_or(self.period.as_delta());
        let mut target = aligned_boundary(&landing, self.period);

        if let Some(last) = self.last {
            if target <= last {
                target = last + self.period.as_delta();
            }
        }
        target
    }

    /// The boundary a tick sampling at `now` is attributed to, having slept
    /// towards `target`.
    ///
    /// Late wake-ups (suspend, a forward clock step) take the boundary of
    /// `now`. Should that not be later than the last completed tick, the
    /// clock went backwards during the sleep and `target` is kept instead.
    pub fn boundary_for(
        &self,
        now: &DateTime<FixedOffset>,
        target: &DateTime<FixedOffset>,
    ) -> DateTime<FixedOffset> {
        if now < target {
            let early = (*target - *now).to_std().unwrap_or_default();
            if early < MIN_DELAY {
                return *target;
            }
        }

        let aligned = aligned_boundary(now, self.period);
        match self.last {
            Some(last) if aligned <= last => *target,
            _ => aligned,
        }
    }

    /// How long to sleep from `now` to reach `target`.
    pub fn sleep_until(now: &DateTime<FixedOffset>, target: &DateTime<FixedOffset>) -> Duration {
        (*target - *now).to_std().unwrap_or_default()
    }

    /// Record that the tick for `boundary` has been processed.
    pub fn complete(&mut self, boundary: DateTime<FixedOffset>) {
        self.last = Some(boundary);
    }
}
