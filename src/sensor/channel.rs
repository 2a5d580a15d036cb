//! Channel-based sensor driver.
//!
//! Receives readings via a tokio channel. This is useful when the embedding
//! application already owns the hardware and pushes readings in, and for
//! driving the logger deterministically in tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{RawReading, SensorDriver, SensorKind};
use crate::error::SensorError;

/// A driver that hands out readings queued by a producer.
///
/// Each `read_retry` consumes at most one queued reading. An empty queue
/// counts as a failed read; a closed channel is a driver error.
///
/// # Example
///
/// ```
/// use dht_logger::sensor::{ChannelDriver, RawReading};
///
/// let (tx, driver) = ChannelDriver::create("bench");
/// tx.send(RawReading::new(20.0, 45.0)).unwrap();
/// ```
#[derive(Debug)]
pub struct ChannelDriver {
    receiver: mpsc::UnboundedReceiver<RawReading>,
    description: String,
}

impl ChannelDriver {
    /// Create a new channel driver.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiving end of an unbounded channel
    /// * `source_description` - A description of where readings come from
    pub fn new(receiver: mpsc::UnboundedReceiver<RawReading>, source_description: &str) -> Self {
        let description = format!("channel: {}", source_description);
        Self {
            receiver,
            description,
        }
    }

    /// Create a channel pair for feeding readings to a ChannelDriver.
    pub fn create(source_description: &str) -> (mpsc::UnboundedSender<RawReading>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self::new(rx, source_description);
        (tx, driver)
    }
}

#[async_trait]
impl SensorDriver for ChannelDriver {
    async fn read_retry(&mut self, _kind: SensorKind, _pin: u32) -> Result<RawReading, SensorError> {
        match self.receiver.try_recv() {
            Ok(raw) => Ok(raw),
            Err(mpsc::error::TryRecvError::Empty) => Ok(RawReading::failed()),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(SensorError::Driver("reading channel closed".to_string()))
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}
