//! Sensor & Reading model.

pub mod catalog;
pub mod simulated;

use std::fmt;
use std::ops::Range;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, SensorError};

pub use catalog::{CatalogBuilder, SensorCatalog, SensorConstructor, SensorFactory};
pub use simulated::{SensorKind, SimulatedSensor};

/// Unique, immutable sensor identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Celsius,
    Kilopascal,
    MillimetersPerSecond,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Kilopascal => "kPa",
            Unit::MillimetersPerSecond => "mm/s",
        }
    }
}

/// A single measurement. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: SensorId,
    /// Nanoseconds since the Unix epoch, strictly increasing per sensor
    pub timestamp: u64,
    pub value: f64,
    pub unit: Unit,
}

/// Construction parameters handed to every sensor constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    /// Simulated I/O latency, sampled uniformly per poll
    pub latency_ms: Range<u64>,
    /// Probability that a reading is replaced by a spike
    pub spike_probability: f64,
    /// Fixed RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            latency_ms: 10..50,
            spike_probability: 0.01,
            seed: None,
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<(), CatalogError> {
        if !(0.0..=1.0).contains(&self.spike_probability) {
            return Err(CatalogError::InvalidSensorConfig {
                reason: format!(
                    "spike_probability must be within [0, 1], got {}",
                    self.spike_probability
                ),
            });
        }
        Ok(())
    }
}

/// Capability set shared by every sensor variant.
#[async_trait]
pub trait Sensor: Send + Sync {
    fn id(&self) -> &SensorId;
    fn type_name(&self) -> &'static str;
    fn unit(&self) -> Unit;

    fn calibrate(&self);
    fn is_calibrated(&self) -> bool;

    /// Produce the next reading. May suspend to simulate I/O.
    async fn next_reading(&self) -> Result<Reading, SensorError>;
}

impl fmt::Debug for dyn Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("id", self.id())
            .field("type", &self.type_name())
            .finish()
    }
}
