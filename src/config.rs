//! Startup configuration.
//!
//! Values are layered with the `config` crate, lowest precedence first:
//!
//! 1. built-in defaults (the values the logger shipped with on the Pi)
//! 2. an optional TOML file passed with `--config`
//! 3. `DHT_LOGGER_*` environment variables (`__` separates nested keys,
//!    e.g. `DHT_LOGGER_SENSOR__DRIVER=iio`)
//! 4. command-line overrides
//!
//! ```toml
//! log_path = "/home/pi/sensor_project/logs/sensor_log.csv"
//! period_seconds = 600
//! use_24_as_midnight = false
//! sensor_pin = 4
//!
//! [sensor]
//! kind = "dht22"
//! driver = "command"
//! command = "dht-read"
//! ```

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schedule::duration::parse_duration;
use crate::schedule::Period;
use crate::sensor::{CommandDriver, IioDriver, RetryPolicy, SensorDriver, SensorKind, SensorReader};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DHT_LOGGER";

/// What to do when the run log itself cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLogFailure {
    /// Report through tracing and keep sampling.
    #[default]
    Drop,
    /// Stop the loop and exit with an error.
    Abort,
}

/// Which [`SensorDriver`] to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Command,
    Iio,
}

/// Sensor section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub kind: SensorKind,
    pub driver: DriverKind,
    /// Helper program for the `command` driver.
    pub command: String,
    /// Device directory for the `iio` driver.
    pub iio_device: PathBuf,
    pub read_attempts: u32,
    pub retry_delay: String,
    pub read_timeout: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Dht22,
            driver: DriverKind::Command,
            command: "dht-read".to_string(),
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            read_attempts: 15,
            retry_delay: "2s".to_string(),
            read_timeout: "10s".to_string(),
        }
    }
}

/// Everything the logger needs, passed explicitly into each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_path: PathBuf,
    pub run_log_path: PathBuf,
    /// Defaults to the log path with `.lock` appended.
    pub lock_path: Option<PathBuf>,
    pub period_seconds: i64,
    pub use_24_as_midnight: bool,
    pub sensor_pin: u32,
    pub run_log_failure: RunLogFailure,
    pub sensor: SensorConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/home/pi/sensor_project/logs/sensor_log.csv"),
            run_log_path: PathBuf::from("/home/pi/sensor_project/logs/run.log"),
            lock_path: None,
            period_seconds: 600,
            use_24_as_midnight: false,
            sensor_pin: 4,
            run_log_failure: RunLogFailure::Drop,
            sensor: SensorConfig::default(),
        }
    }
}

/// Command-line values that win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_path: Option<PathBuf>,
    pub run_log_path: Option<PathBuf>,
    pub lock_path: Option<PathBuf>,
    pub period_seconds: Option<i64>,
    pub use_24_as_midnight: Option<bool>,
    pub sensor_pin: Option<u32>,
    pub driver: Option<DriverKind>,
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

impl LoggerConfig {
    /// Layer defaults, an optional file, the environment and `overrides`,
    /// then validate the result.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let driver = overrides.driver.map(|d| match d {
            DriverKind::Command => "command",
            DriverKind::Iio => "iio",
        });
        let config = builder
            .set_override_option("log_path", path_value(&overrides.log_path))?
            .set_override_option("run_log_path", path_value(&overrides.run_log_path))?
            .set_override_option("lock_path", path_value(&overrides.lock_path))?
            .set_override_option("period_seconds", overrides.period_seconds)?
            .set_override_option("use_24_as_midnight", overrides.use_24_as_midnight)?
            .set_override_option("sensor_pin", overrides.sensor_pin.map(i64::from))?
            .set_override_option("sensor.driver", driver)?
            .build()?;

        let loaded: LoggerConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check every derived value once, before anything touches the disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.period()?;
        self.retry_policy()?;
        Ok(())
    }

    /// The sampling period; fails fast on zero or negative values.
    pub fn period(&self) -> Result<Period, ConfigError> {
        Period::new(self.period_seconds)
    }

    /// Lock path, scoped to the log path unless set explicitly.
    pub fn lock_path(&self) -> PathBuf {
        self.lock_path.clone().unwrap_or_else(|| {
            let mut name = self.log_path.clone().into_os_string();
            name.push(".lock");
            PathBuf::from(name)
        })
    }

    /// Retry policy handed to the hardware drivers.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.sensor.read_attempts == 0 {
            return Err(ConfigError::NoReadAttempts);
        }
        let delay = parse_duration(&self.sensor.retry_delay).map_err(|e| {
            ConfigError::InvalidDuration {
                key: "sensor.retry_delay",
                reason: e.to_string(),
            }
        })?;
        let timeout = parse_duration(&self.sensor.read_timeout).map_err(|e| {
            ConfigError::InvalidDuration {
                key: "sensor.read_timeout",
                reason: e.to_string(),
            }
        })?;
        Ok(RetryPolicy {
            attempts: self.sensor.read_attempts,
            delay,
            timeout,
        })
    }

    /// Build the configured driver wrapped in a validating reader.
    pub fn sensor_reader(&self) -> Result<SensorReader, ConfigError> {
        let policy = self.retry_policy()?;
        let driver: Box<dyn SensorDriver> = match self.sensor.driver {
            DriverKind::Command => Box::new(CommandDriver::new(self.sensor.command.clone(), policy)),
            DriverKind::Iio => Box::new(IioDriver::new(&self.sensor.iio_device, policy)),
        };
        Ok(SensorReader::new(driver, self.sensor.kind, self.sensor_pin))
    }
}
