//! # dht-logger
//!
//! A periodic temperature/humidity logger that writes a durable, uniformly
//! spaced CSV time series.
//!
//! Samples are attributed to fixed wall-clock boundaries (every 10 minutes on
//! the clock by default), so consecutive rows are exactly one period apart no
//! matter when the process started or how long a read took. Each row is
//! fsynced before the loop moves on, and only one logger may own a log at a
//! time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           logger                             │
//! │  ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐  │
//! │  │  guard  │──▶│ schedule │──▶│  sensor  │──▶│  logfile   │  │
//! │  │ (flock) │   │ (align)  │   │ (reader) │   │ (csv, run) │  │
//! │  └─────────┘   └────┬─────┘   └────┬─────┘   └────────────┘  │
//! │                     │              │                         │
//! │                     ▼              ▼                         │
//! │                   Clock     SensorDriver ◀── Command | Iio | Channel
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`schedule`]**: Boundary arithmetic, the [`Clock`] seam and the tick
//!   [`Schedule`]
//! - **[`sensor`]**: The [`SensorDriver`] capability and the validating
//!   [`SensorReader`]
//! - **[`logfile`]**: CSV header/row writes and the lazily created run log
//! - **[`guard`]**: The single-instance lock
//! - **[`logger`]**: The sampling loop tying everything together
//! - **[`config`]**: Layered startup configuration
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Defaults: DHT22 via the `dht-read` helper on GPIO 4, every 600s
//! dht-logger
//!
//! # Read the kernel IIO device and log every 5 minutes
//! dht-logger --driver iio --period-seconds 300 --log-path /data/climate.csv
//! ```
//!
//! ### As a library with a channel driver
//!
//! ```no_run
//! use std::sync::Arc;
//! use dht_logger::{ChannelDriver, Logger, LoggerConfig, RawReading, SensorKind, SensorReader,
//!                  Startup, SystemClock};
//!
//! # tokio_test::block_on(async {
//! let (tx, driver) = ChannelDriver::create("my-board");
//! let reader = SensorReader::new(Box::new(driver), SensorKind::Dht22, 4);
//! let config = LoggerConfig::default();
//!
//! if let Startup::Ready(mut logger, _guard) =
//!     Logger::start(&config, reader, Arc::new(SystemClock)).unwrap()
//! {
//!     tx.send(RawReading::new(20.0, 45.0)).unwrap();
//!     logger.run_for(1).await.unwrap();
//! }
//! # });
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod logfile;
pub mod logger;
pub mod schedule;
pub mod sensor;

// Re-export main types for convenience
pub use config::{DriverKind, LoggerConfig, Overrides, RunLogFailure};
pub use error::{ConfigError, GuardError, LogError, LoggerError, SensorError};
pub use guard::{Acquisition, InstanceGuard};
pub use logfile::{append_row, ensure_header, Row, RunLog};
pub use logger::{Logger, LoggerStats, Phase, Startup, TickOutcome};
pub use schedule::{
    aligned_boundary, delay_to_next_boundary, timestamp_fields, Clock, ManualClock, Period,
    Schedule, SystemClock,
};
pub use sensor::{
    celsius_to_fahrenheit, ChannelDriver, CommandDriver, IioDriver, RawReading, Reading,
    SensorDriver, SensorKind, SensorReader,
};
