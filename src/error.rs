//! Error types for the logger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the sensor.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The driver returned no valid reading after its retries.
    #[error("Sensor read failed")]
    ReadFailed,

    /// A value came back but is not physically plausible.
    #[error("Sensor value out of range: {0}")]
    OutOfRange(String),

    /// The driver itself could not be invoked or its output parsed.
    #[error("Sensor driver error: {0}")]
    Driver(String),

    /// A single read attempt exceeded the configured timeout.
    #[error("Sensor read timed out")]
    Timeout,
}

impl From<std::io::Error> for SensorError {
    fn from(err: std::io::Error) -> Self {
        SensorError::Driver(err.to_string())
    }
}

/// Errors raised by the CSV log writer and the run log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Filesystem failure on the given path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding failure.
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        LogError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while acquiring the single-instance guard.
///
/// Contention is not an error; see [`crate::guard::Acquisition::AlreadyRunning`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// The lock file could not be created, opened or locked.
    #[error("Lock file {path} unavailable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The sampling period must be a positive number of seconds.
    #[error("Sampling period must be a positive number of seconds, got {0}")]
    InvalidPeriod(i64),

    /// A configured duration string could not be parsed.
    #[error("Invalid duration for {key}: {reason}")]
    InvalidDuration { key: &'static str, reason: String },

    /// Retry count of zero would never read the sensor.
    #[error("sensor.read_attempts must be at least 1")]
    NoReadAttempts,

    /// Layering or deserialising the configuration failed.
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

/// Errors that stop the logger from starting or keep it from running.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Invalid configuration detected at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The single-instance lock could not be taken for a reason other
    /// than contention.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// The log header could not be written at startup.
    #[error("Cannot initialise log: {0}")]
    Header(#[source] LogError),

    /// The run log could not be written and the policy is to abort.
    #[error("Run log unwritable: {0}")]
    RunLog(#[source] LogError),
}
