//! Linux IIO sensor driver.
//!
//! The in-kernel `dht11` driver (which also handles DHT22/AM2302 wired to a
//! GPIO via the `dht11` device-tree overlay) exposes each reading as a sysfs
//! attribute in thousandths of a unit. Reads fail with `EIO` whenever the
//! bit timing or checksum is off, which is frequent, hence the retry policy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::trace;

use super::{RawReading, RetryPolicy, SensorDriver, SensorKind};
use crate::error::SensorError;

const TEMPERATURE_ATTR: &str = "in_temp_input";
const HUMIDITY_ATTR: &str = "in_humidityrelative_input";

/// A driver that reads an IIO device directory such as
/// `/sys/bus/iio/devices/iio:device0`.
#[derive(Debug)]
pub struct IioDriver {
    device: PathBuf,
    policy: RetryPolicy,
    description: String,
}

impl IioDriver {
    pub fn new<P: AsRef<Path>>(device: P, policy: RetryPolicy) -> Self {
        let device = device.as_ref().to_path_buf();
        let description = format!("iio: {}", device.display());
        Self {
            device,
            policy,
            description,
        }
    }

    async fn attempt(device: &Path) -> Result<RawReading, SensorError> {
        let temperature = read_milli(&device.join(TEMPERATURE_ATTR)).await?;
        let humidity = read_milli(&device.join(HUMIDITY_ATTR)).await?;
        Ok(RawReading::new(temperature, humidity))
    }
}

/// Read one sysfs attribute holding an integer in thousandths.
async fn read_milli(path: &Path) -> Result<f64, SensorError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SensorError::Driver(format!("Read error on {}: {}", path.display(), e)))?;
    let milli: i64 = content
        .trim()
        .parse()
        .map_err(|e| SensorError::Driver(format!("Parse error on {}: {}", path.display(), e)))?;
    Ok(milli as f64 / 1000.0)
}

#[async_trait]
impl SensorDriver for IioDriver {
    async fn read_retry(&mut self, kind: SensorKind, pin: u32) -> Result<RawReading, SensorError> {
        // The GPIO is bound by the device tree; kind and pin are informational here
        trace!("reading {} ({} on pin {})", self.device.display(), kind, pin);
        let device = self.device.as_path();
        self.policy
            .run(&self.description, || Self::attempt(device))
            .await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_iio_reads_milli_units() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPERATURE_ATTR), "21300\n").unwrap();
        std::fs::write(dir.path().join(HUMIDITY_ATTR), "45200\n").unwrap();

        let mut driver = IioDriver::new(dir.path(), quick_policy());
        let raw = driver.read_retry(SensorKind::Dht22, 4).await.unwrap();
        assert_eq!(raw, RawReading::new(21.3, 45.2));
    }

    #[tokio::test]
    async fn test_iio_missing_device() {
        let mut driver = IioDriver::new("/nonexistent/iio:device9", quick_policy());
        assert_eq!(driver.description(), "iio: /nonexistent/iio:device9");

        let err = driver.read_retry(SensorKind::Dht22, 4).await.unwrap_err();
        assert!(err.to_string().contains("Read error"));
    }

    #[tokio::test]
    async fn test_iio_garbage_attribute() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPERATURE_ATTR), "hot\n").unwrap();
        std::fs::write(dir.path().join(HUMIDITY_ATTR), "45200\n").unwrap();

        let mut driver = IioDriver::new(dir.path(), quick_policy());
        let err = driver.read_retry(SensorKind::Dht22, 4).await.unwrap_err();
        assert!(err.to_string().contains("Parse error"));
    }
}
