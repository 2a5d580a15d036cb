//! The sampling loop.
//!
//! ```text
//! Starting ──(lock held elsewhere)──▶ exit, see Startup::AlreadyRunning
//!    │
//!    ▼
//! Aligning ──▶ Sampling ──▶ Writing ──▶ Sleeping
//!                 ▲  │                    │
//!                 │  └──(read failed)────▶│
//!                 └───────────────────────┘
//! ```
//!
//! Every failure inside a tick is contained in that tick: it is printed,
//! appended to the run log and the loop moves on to the next boundary.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, error, info, warn};

use crate::config::{LoggerConfig, RunLogFailure};
use crate::error::LoggerError;
use crate::guard::{Acquisition, InstanceGuard};
use crate::logfile::{append_row, ensure_header, HeaderStatus, Row, RunLog};
use crate::schedule::duration::format_duration;
use crate::schedule::{timestamp_fields, Clock, Schedule};
use crate::sensor::SensorReader;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Taking the lock and preparing the log.
    Starting,
    /// Waiting for the first boundary.
    Aligning,
    /// Reading the sensor for the current boundary.
    Sampling,
    /// Appending the row.
    Writing,
    /// Waiting for the next boundary.
    Sleeping,
}

impl Phase {
    /// Returns the display label for this phase.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::Aligning => "aligning",
            Phase::Sampling => "sampling",
            Phase::Writing => "writing",
            Phase::Sleeping => "sleeping",
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The row was appended and synced.
    Written(Row),
    /// The tick was skipped; the message went to the run log.
    Failed(String),
}

/// Running totals, reported on every tick and at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    pub rows_written: u64,
    pub failed_ticks: u64,
    pub consecutive_failures: u64,
}

/// Result of [`Logger::start`].
#[derive(Debug)]
pub enum Startup {
    /// The lock is ours and the log has its header.
    Ready(Logger, InstanceGuard),
    /// Another process is logging; nothing was touched.
    AlreadyRunning,
}

/// The periodic logger.
#[derive(Debug)]
pub struct Logger {
    sensor: SensorReader,
    clock: Arc<dyn Clock>,
    log_path: PathBuf,
    run_log: RunLog,
    use_24_as_midnight: bool,
    run_log_failure: RunLogFailure,
    schedule: Schedule,
    phase: Phase,
    stats: LoggerStats,
}

impl Logger {
    /// Build a logger without touching the filesystem.
    pub fn new(
        config: &LoggerConfig,
        sensor: SensorReader,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LoggerError> {
        Ok(Self {
            sensor,
            clock,
            log_path: config.log_path.clone(),
            run_log: RunLog::new(&config.run_log_path),
            use_24_as_midnight: config.use_24_as_midnight,
            run_log_failure: config.run_log_failure,
            schedule: Schedule::new(config.period()?),
            phase: Phase::Starting,
            stats: LoggerStats::default(),
        })
    }

    /// Take the single-instance lock, then make sure the log has a header.
    ///
    /// On contention nothing else happens: no header, no sampling.
    pub fn start(
        config: &LoggerConfig,
        sensor: SensorReader,
        clock: Arc<dyn Clock>,
    ) -> Result<Startup, LoggerError> {
        let mut logger = Self::new(config, sensor, clock)?;

        let guard = match InstanceGuard::acquire(config.lock_path())? {
            Acquisition::Acquired(guard) => guard,
            Acquisition::AlreadyRunning => return Ok(Startup::AlreadyRunning),
        };

        match ensure_header(&logger.log_path).map_err(LoggerError::Header)? {
            HeaderStatus::Written => info!("Created {}", logger.log_path.display()),
            HeaderStatus::Present => {}
            HeaderStatus::Repaired { dropped_bytes } => warn!(
                "Recovered {} after an interrupted write ({} bytes dropped)",
                logger.log_path.display(),
                dropped_bytes
            ),
        }

        info!(
            "Logging {} to {} every {}",
            logger.sensor.description(),
            logger.log_path.display(),
            format_duration(logger.schedule.period().as_duration())
        );
        logger.phase = Phase::Aligning;
        Ok(Startup::Ready(logger, guard))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> LoggerStats {
        self.stats
    }

    /// Sample forever. Only returns if the run log fails under the abort policy.
    pub async fn run(&mut self) -> Result<(), LoggerError> {
        self.drive(None).await
    }

    /// Sample exactly `ticks` boundaries, then return.
    pub async fn run_for(&mut self, ticks: u64) -> Result<(), LoggerError> {
        self.drive(Some(ticks)).await
    }

    async fn drive(&mut self, limit: Option<u64>) -> Result<(), LoggerError> {
        if limit == Some(0) {
            return Ok(());
        }
        self.phase = Phase::Aligning;
        let mut boundary = self.sleep_to_next_boundary().await;
        let mut done = 0;

        loop {
            self.tick(boundary).await?;
            done += 1;
            if limit.is_some_and(|n| done >= n) {
                return Ok(());
            }
            self.phase = Phase::Sleeping;
            boundary = self.sleep_to_next_boundary().await;
        }
    }

    /// Sleep towards the next boundary and return the one the wake-up belongs to.
    async fn sleep_to_next_boundary(&mut self) -> DateTime<FixedOffset> {
        let now = self.clock.now();
        let target = self.schedule.next_target(&now);
        let delay = Schedule::sleep_until(&now, &target);
        debug!(
            "{}: {} until {}",
            self.phase.label(),
            format_duration(delay),
            target
        );
        self.clock.sleep(delay).await;

        let woke = self.clock.now();
        let boundary = self.schedule.boundary_for(&woke, &target);
        if boundary != target {
            warn!("Woke at {} instead of {}, sampling for {}", woke, target, boundary);
        }
        boundary
    }

    /// Process the tick attributed to `boundary`.
    ///
    /// The label is rendered in the clock's local time at `boundary`, so a
    /// UTC offset change during the preceding sleep is honoured.
    pub async fn tick(&mut self, boundary: DateTime<FixedOffset>) -> Result<TickOutcome, LoggerError> {
        self.phase = Phase::Sampling;
        debug!("{}: boundary {}", self.phase.label(), boundary);
        let label = timestamp_fields(&self.clock.local(&boundary), self.use_24_as_midnight);

        let outcome = match self.sensor.read().await {
            Ok(reading) => {
                self.phase = Phase::Writing;
                let row = Row::new(label, &reading);
                match append_row(&self.log_path, &row) {
                    Ok(()) => TickOutcome::Written(row),
                    Err(e) => TickOutcome::Failed(e.to_string()),
                }
            }
            Err(e) => TickOutcome::Failed(e.to_string()),
        };
        self.schedule.complete(boundary);

        match &outcome {
            TickOutcome::Written(row) => {
                self.stats.rows_written += 1;
                self.stats.consecutive_failures = 0;
                println!("Wrote {}", row);
                info!(
                    "Wrote {} {} ({} rows, {} failed ticks)",
                    row.date, row.time, self.stats.rows_written, self.stats.failed_ticks
                );
            }
            TickOutcome::Failed(message) => {
                self.stats.failed_ticks += 1;
                self.stats.consecutive_failures += 1;
                warn!(
                    "Tick {} failed ({} in a row): {}",
                    boundary, self.stats.consecutive_failures, message
                );
                self.report_failure(message)?;
            }
        }

        Ok(outcome)
    }

    fn report_failure(&self, message: &str) -> Result<(), LoggerError> {
        let now = self.clock.now();
        println!("{}", RunLog::format_entry(&now, message));

        if let Err(e) = self.run_log.record(&now, message) {
            match self.run_log_failure {
                RunLogFailure::Drop => error!("Could not write run log: {}", e),
                RunLogFailure::Abort => return Err(LoggerError::RunLog(e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ManualClock;
    use crate::sensor::{ChannelDriver, RawReading, SensorKind};
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    fn config_in(dir: &std::path::Path) -> LoggerConfig {
        LoggerConfig {
            log_path: dir.join("logs/sensor_log.csv"),
            run_log_path: dir.join("logs/run.log"),
            ..LoggerConfig::default()
        }
    }

    fn channel_reader() -> (tokio::sync::mpsc::UnboundedSender<RawReading>, SensorReader) {
        let (tx, driver) = ChannelDriver::create("test");
        (tx, SensorReader::new(Box::new(driver), SensorKind::Dht22, 4))
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Sampling.label(), "sampling");
        assert_eq!(Phase::Sleeping.label(), "sleeping");
    }

    #[test]
    fn test_new_rejects_bad_period() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggerConfig {
            period_seconds: -600,
            ..config_in(dir.path())
        };
        let (_tx, reader) = channel_reader();
        let clock = Arc::new(ManualClock::new(utc(2024, 1, 1, 0, 0, 0)));
        assert!(matches!(
            Logger::new(&config, reader, clock),
            Err(LoggerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_tick_writes_row_with_boundary_label() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let (tx, reader) = channel_reader();
        let clock = Arc::new(ManualClock::new(utc(2024, 1, 1, 0, 0, 2)));

        let Startup::Ready(mut logger, _guard) = Logger::start(&config, reader, clock).unwrap() else {
            panic!("lock should be free");
        };
        assert_eq!(logger.phase(), Phase::Aligning);

        tx.send(RawReading::new(20.0, 45.2)).unwrap();
        let outcome = logger.tick(utc(2024, 1, 1, 0, 0, 0)).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Written(_)));
        assert_eq!(logger.phase(), Phase::Writing);

        let content = std::fs::read_to_string(&config.log_path).unwrap();
        assert_eq!(
            content,
            "date,time_24h,temp_F,humidity_pct\n2024-01-01,0000,68.00,45.20\n"
        );
        assert!(!config.run_log_path.exists());
    }

    #[tokio::test]
    async fn test_start_backs_off_when_locked() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        let _held = InstanceGuard::acquire(config.lock_path()).unwrap();

        let (_tx, reader) = channel_reader();
        let clock = Arc::new(ManualClock::new(utc(2024, 1, 1, 0, 0, 0)));
        let startup = Logger::start(&config, reader, clock).unwrap();

        assert!(matches!(startup, Startup::AlreadyRunning));
        assert!(!config.log_path.exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let (tx, reader) = channel_reader();
        let clock = Arc::new(ManualClock::new(utc(2024, 1, 1, 0, 0, 0)));
        let mut logger = Logger::new(&config, reader, clock).unwrap();

        // The log path is a directory, so the append fails
        std::fs::create_dir_all(&config.log_path).unwrap();
        tx.send(RawReading::new(20.0, 45.2)).unwrap();

        let outcome = logger.tick(utc(2024, 1, 1, 0, 10, 0)).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(_)));
        assert_eq!(logger.stats().failed_ticks, 1);

        let run_log = std::fs::read_to_string(&config.run_log_path).unwrap();
        assert!(run_log.starts_with("2024-01-01 00:00:00 ERROR: I/O error on"));
    }

    #[tokio::test]
    async fn test_run_log_failure_policies() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        for (policy, should_abort) in [(RunLogFailure::Drop, false), (RunLogFailure::Abort, true)] {
            let config = LoggerConfig {
                run_log_path: blocker.join("run.log"),
                run_log_failure: policy,
                ..config_in(dir.path())
            };
            let (_tx, reader) = channel_reader();
            let clock = Arc::new(ManualClock::new(utc(2024, 1, 1, 0, 0, 0)));
            let mut logger = Logger::new(&config, reader, clock).unwrap();

            let result = logger.tick(utc(2024, 1, 1, 0, 10, 0)).await;
            assert_eq!(matches!(result, Err(LoggerError::RunLog(_))), should_abort);
        }
    }
}
