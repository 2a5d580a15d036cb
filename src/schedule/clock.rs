//! Time source and sleeper used by the sampling loop.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, TimeDelta};

/// Wall clock plus the ability to suspend until later.
///
/// Instants carry their UTC offset so boundary labels come out in the
/// clock's local time while the boundary grid stays on epoch seconds.
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// The current wall-clock time.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Express `instant` in the offset local time has at that instant.
    fn local(&self, instant: &DateTime<FixedOffset>) -> DateTime<FixedOffset>;
}

/// The host's clock in the local timezone, sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn local(&self, instant: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        instant.with_timezone(&Local).fixed_offset()
    }
}

/// A clock that only moves when slept on.
///
/// Each `sleep` returns immediately after advancing the clock by the requested
/// duration plus an optional skew, which simulates timers firing early or late.
/// A single UTC offset change can be scheduled to model a DST transition.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<FixedOffset>,
    skew: TimeDelta,
    sleeps: Vec<Duration>,
    transition: Option<(DateTime<FixedOffset>, FixedOffset)>,
}

impl ManualState {
    fn offset_at(&self, instant: &DateTime<FixedOffset>) -> FixedOffset {
        match self.transition {
            Some((at, offset)) if *instant >= at => offset,
            _ => *self.now.offset(),
        }
    }

    fn move_by(&mut self, by: TimeDelta) {
        let moved = self.now + by;
        self.now = moved.with_timezone(&self.offset_at(&moved));
        if let Some((at, _)) = self.transition {
            if self.now >= at {
                self.transition = None;
            }
        }
    }
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                skew: TimeDelta::zero(),
                sleeps: Vec::new(),
                transition: None,
            }),
        }
    }

    /// Add `skew` to every subsequent sleep (negative wakes early).
    pub fn set_wake_skew(&self, skew: TimeDelta) {
        self.lock().skew = skew;
    }

    /// Switch local time to `offset` once the clock reaches `at`.
    pub fn change_offset_at(&self, at: DateTime<FixedOffset>, offset: FixedOffset) {
        self.lock().transition = Some((at, offset));
    }

    /// Move the clock without recording a sleep.
    pub fn advance(&self, by: TimeDelta) {
        self.lock().move_by(by);
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.sleeps.push(duration);
        let step = TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero());
        let skew = state.skew;
        state.move_by(step + skew);
    }

    fn local(&self, instant: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let state = self.lock();
        instant.with_timezone(&state.offset_at(instant))
    }
}
