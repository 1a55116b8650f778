//! Error taxonomy.
//!
//! Configuration and catalog errors fail the call that caused them. Collection,
//! numeric and security errors are scoped to a single sensor, batch or alert and
//! are carried as data by the components that produce them.

use std::time::Duration;

use thiserror::Error;

use crate::sensor::SensorId;

/// Rejected settings or strategy names.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown detection strategy '{name}' (available: zscore, threshold)")]
    UnknownStrategy { name: String },

    #[error("configuration already initialized")]
    AlreadyInitialized,

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("sensor type '{name}' is already registered")]
    DuplicateType { name: String },

    #[error("unknown sensor type '{name}' (available: {available})")]
    UnknownSensorType { name: String, available: String },

    #[error("sensor type must be a non-empty string")]
    EmptyTypeName,

    #[error("catalog has no sensor types registered")]
    EmptyCatalog,

    #[error("invalid sensor config: {reason}")]
    InvalidSensorConfig { reason: String },
}

/// Raised by a sensor while producing a reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor {0} must be calibrated before reading data")]
    NotCalibrated(SensorId),

    #[error("sensor {sensor} fault: {message}")]
    Fault { sensor: SensorId, message: String },
}

/// Per-sensor outcome of a failed poll. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("poll timed out after {after:?}")]
    Timeout { after: Duration },

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("poll task panicked: {message}")]
    Panicked { message: String },
}

impl CollectionError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectionError::Timeout { .. } => "timeout",
            CollectionError::Sensor(_) => "sensor",
            CollectionError::Panicked { .. } => "panic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("cannot compute statistics over an empty batch")]
    EmptyBatch,

    #[error("batch contains a non-finite value at index {index}")]
    NonFinite { index: usize },
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("integrity check failed: ciphertext was tampered with or the key is wrong")]
    Integrity,

    #[error("unsafe filename '{0}'")]
    UnsafeFilename(String),

    #[error("encryption failed")]
    Encryption,

    #[error("alert serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("alert artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for the entry point.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type Result<T, E = SentinelError> = std::result::Result<T, E>;
