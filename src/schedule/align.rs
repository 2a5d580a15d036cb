//! Wall-clock boundary arithmetic.
//!
//! A boundary is an exact multiple of the sampling period counted from the
//! Unix epoch. Labels are rendered in the timezone of the instant passed in,
//! so the same arithmetic serves `Local` in production and `Utc` in tests.

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, Days, TimeDelta, TimeZone};

use crate::error::ConfigError;

/// Delays shorter than this are pushed out by one full period.
pub const MIN_DELAY: Duration = Duration::from_millis(500);

/// Sampling period in whole seconds, always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period(NonZeroU32);

impl Period {
    /// Validate a period given in seconds.
    pub fn new(secs: i64) -> Result<Self, ConfigError> {
        u32::try_from(secs)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Period)
            .ok_or(ConfigError::InvalidPeriod(secs))
    }

    /// Period length in seconds.
    pub fn as_secs(&self) -> i64 {
        i64::from(self.0.get())
    }

    /// Period length as a `Duration`.
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0.get()))
    }

    pub(crate) fn as_delta(&self) -> TimeDelta {
        TimeDelta::seconds(self.as_secs())
    }
}

/// Date and clock-time label attributed to a boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLabel {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HHMM`, or `2400` under the midnight convention
    pub time: String,
}

/// The largest boundary at or before `now`.
///
/// An instant exactly on a boundary aligns to itself.
pub fn aligned_boundary<Tz: TimeZone>(now: &DateTime<Tz>, period: Period) -> DateTime<Tz> {
    let into_slot = now.timestamp().rem_euclid(period.as_secs());
    now.clone()
        - TimeDelta::seconds(into_slot)
        - TimeDelta::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

/// Time left until the next boundary after `now`.
///
/// Equals `P - (now mod P)`, plus one extra period when that would be shorter
/// than [`MIN_DELAY`], so a wake-up landing just short of a boundary never
/// produces a near-zero nap and a second sample for the same slot.
pub fn delay_to_next_boundary<Tz: TimeZone>(now: &DateTime<Tz>, period: Period) -> Duration {
    let next = aligned_boundary(now, period) + period.as_delta();
    let mut delay = (next - now.clone()).to_std().unwrap_or_default();
    if delay < MIN_DELAY {
        delay += period.as_duration();
    }
    delay
}

/// Render the date and `HHMM` label of a boundary.
///
/// With `use_24_as_midnight`, a `0000` label becomes `2400` of the previous
/// calendar day.
pub fn timestamp_fields<Tz: TimeZone>(dt: &DateTime<Tz>, use_24_as_midnight: bool) -> BoundaryLabel {
    let local = dt.naive_local();
    let time = local.format("%H%M").to_string();

    if use_24_as_midnight && time == "0000" {
        let previous = local.date() - Days::new(1);
        return BoundaryLabel {
            date: previous.format("%Y-%m-%d").to_string(),
            time: "2400".to_string(),
        };
    }

    BoundaryLabel {
        date: local.format("%Y-%m-%d").to_string(),
        time,
    }
}
