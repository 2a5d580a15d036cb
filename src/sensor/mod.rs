//! Sensor driver abstraction and the validating reader on top of it.
//!
//! The logger never talks to hardware directly. A [`SensorDriver`] provides the
//! external capability "read temperature and humidity, retrying internally",
//! and [`SensorReader`] turns its possibly-missing values into a validated
//! [`Reading`] or a [`SensorError`].

mod channel;
mod command;
mod iio;

pub use channel::ChannelDriver;
pub use command::CommandDriver;
pub use iio::IioDriver;

use std::fmt::{self, Debug};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SensorError;

/// Sensor families accepted by the drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Dht11,
    #[default]
    Dht22,
    Am2302,
}

impl SensorKind {
    /// Name passed to external drivers.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Dht11 => "dht11",
            SensorKind::Dht22 => "dht22",
            SensorKind::Am2302 => "am2302",
        }
    }

    /// Plausible temperature range in °C for this family.
    fn temperature_range(&self) -> (f64, f64) {
        match self {
            SensorKind::Dht11 => (0.0, 50.0),
            SensorKind::Dht22 | SensorKind::Am2302 => (-40.0, 80.0),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a driver hands back: either value may be missing after retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default, rename = "temperature")]
    pub temperature_c: Option<f64>,
}

impl RawReading {
    /// A complete reading.
    pub fn new(temperature_c: f64, humidity: f64) -> Self {
        Self {
            humidity: Some(humidity),
            temperature_c: Some(temperature_c),
        }
    }

    /// The "nothing after retries" result.
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.humidity.is_some() && self.temperature_c.is_some()
    }
}

/// A validated sample from the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

impl Reading {
    pub fn temperature_f(&self) -> f64 {
        celsius_to_fahrenheit(self.temperature_c)
    }
}

/// Convert degrees Celsius to degrees Fahrenheit.
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// The external sensor capability.
///
/// Implementations perform blocking-in-spirit hardware I/O bounded by their
/// own [`RetryPolicy`], and report "no valid reading" as `None` fields rather
/// than as an error.
#[async_trait]
pub trait SensorDriver: Send + Debug {
    /// Read once, retrying internally.
    async fn read_retry(&mut self, kind: SensorKind, pin: u32) -> Result<RawReading, SensorError>;

    /// Returns a human-readable description of the driver.
    fn description(&self) -> &str;
}

/// How a driver retries a flaky read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub attempts: u32,
    /// Pause between failed attempts.
    pub delay: Duration,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` until it yields a complete reading or attempts run out.
    ///
    /// Exhaustion returns an empty reading, unless every attempt errored, in
    /// which case the last error is returned so misconfiguration stays visible.
    pub async fn run<F, Fut>(&self, what: &str, mut attempt: F) -> Result<RawReading, SensorError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<RawReading, SensorError>> + Send,
    {
        let attempts = self.attempts.max(1);
        let mut last_error = None;
        let mut got_reply = false;

        for n in 1..=attempts {
            match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(Ok(raw)) if raw.is_complete() => return Ok(raw),
                Ok(Ok(_)) => {
                    got_reply = true;
                    debug!("{}: incomplete reading on attempt {}/{}", what, n, attempts);
                }
                Ok(Err(e)) => {
                    debug!("{}: attempt {}/{} failed: {}", what, n, attempts, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    debug!("{}: attempt {}/{} timed out", what, n, attempts);
                    last_error = Some(SensorError::Timeout);
                }
            }
            if n < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        match last_error {
            Some(e) if !got_reply => Err(e),
            _ => Ok(RawReading::failed()),
        }
    }
}

/// Validating front end over a [`SensorDriver`].
#[derive(Debug)]
pub struct SensorReader {
    driver: Box<dyn SensorDriver>,
    kind: SensorKind,
    pin: u32,
}

impl SensorReader {
    pub fn new(driver: Box<dyn SensorDriver>, kind: SensorKind, pin: u32) -> Self {
        Self { driver, kind, pin }
    }

    pub fn description(&self) -> &str {
        self.driver.description()
    }

    /// Obtain one validated reading.
    pub async fn read(&mut self) -> Result<Reading, SensorError> {
        let raw = self.driver.read_retry(self.kind, self.pin).await?;
        let (Some(temperature_c), Some(humidity_pct)) = (raw.temperature_c, raw.humidity) else {
            return Err(SensorError::ReadFailed);
        };

        let (t_min, t_max) = self.kind.temperature_range();
        if !temperature_c.is_finite() || temperature_c < t_min || temperature_c > t_max {
            return Err(SensorError::OutOfRange(format!(
                "temperature {temperature_c} °C outside {t_min}..={t_max} for {}",
                self.kind
            )));
        }
        if !humidity_pct.is_finite() || !(0.0..=100.0).contains(&humidity_pct) {
            return Err(SensorError::OutOfRange(format!(
                "humidity {humidity_pct} % outside 0..=100"
            )));
        }

        Ok(Reading {
            temperature_c,
            humidity_pct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_with(readings: &[RawReading]) -> SensorReader {
        let (tx, driver) = ChannelDriver::create("test");
        for r in readings {
            tx.send(*r).unwrap();
        }
        SensorReader::new(Box::new(driver), SensorKind::Dht22, 4)
    }

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert_eq!(format!("{:.2}", celsius_to_fahrenheit(20.0)), "68.00");
        assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
    }

    #[test]
    fn test_raw_reading_parses_nulls() {
        let raw: RawReading = serde_json::from_str(r#"{"humidity": null, "temperature": 21.5}"#).unwrap();
        assert_eq!(raw.humidity, None);
        assert_eq!(raw.temperature_c, Some(21.5));
        assert!(!raw.is_complete());

        let raw: RawReading = serde_json::from_str("{}").unwrap();
        assert_eq!(raw, RawReading::failed());
    }

    #[tokio::test]
    async fn test_reader_returns_valid_reading() {
        let mut reader = reader_with(&[RawReading::new(20.0, 45.2)]);
        let reading = reader.read().await.unwrap();
        assert_eq!(reading.temperature_c, 20.0);
        assert_eq!(reading.humidity_pct, 45.2);
        assert_eq!(format!("{:.2}", reading.temperature_f()), "68.00");
    }

    #[tokio::test]
    async fn test_reader_fails_on_missing_values() {
        let mut reader = reader_with(&[RawReading {
            humidity: Some(40.0),
            temperature_c: None,
        }]);
        assert!(matches!(reader.read().await, Err(SensorError::ReadFailed)));
    }

    #[tokio::test]
    async fn test_reader_rejects_implausible_values() {
        let mut reader = reader_with(&[
            RawReading::new(20.0, 140.0),
            RawReading::new(-90.0, 50.0),
            RawReading::new(f64::NAN, 50.0),
        ]);
        assert!(matches!(reader.read().await, Err(SensorError::OutOfRange(_))));
        assert!(matches!(reader.read().await, Err(SensorError::OutOfRange(_))));
        assert!(matches!(reader.read().await, Err(SensorError::OutOfRange(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_stops_at_first_complete_reading() {
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(1),
        };
        let mut calls = 0;
        let raw = policy
            .run("test", || {
                calls += 1;
                let result = if calls < 3 {
                    RawReading::failed()
                } else {
                    RawReading::new(21.0, 50.0)
                };
                async move { Ok(result) }
            })
            .await
            .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(raw, RawReading::new(21.0, 50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_exhaustion() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(10),
            timeout: Duration::from_secs(1),
        };

        let raw = policy
            .run("test", || async { Ok(RawReading::failed()) })
            .await
            .unwrap();
        assert!(!raw.is_complete());

        let err = policy
            .run("test", || async { Err(SensorError::Driver("no such device".into())) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such device"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_times_out_slow_attempts() {
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let err = policy
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(RawReading::new(20.0, 40.0))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SensorError::Timeout));
    }
}
