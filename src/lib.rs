//! Concurrent sensor collection and anomaly detection.
//!
//! Sensors are built from an explicit catalog, tracked by a non-owning cache and
//! polled concurrently each tick. Readings feed batch statistics and a
//! per-sensor sliding-window detector; anomalous results become alerts that are
//! hashed and encrypted before they are written.

pub mod alert;
pub mod algo;
pub mod cache;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod security;
pub mod sensor;
pub mod stats;

pub use alert::{Alert, AlertVault};
pub use cache::SensorCache;
pub use collector::{Batch, Collector};
pub use config::{Configuration, Settings, SettingsUpdate, get_config};
pub use engine::{AnomalyResult, DetectionEngine, Severity, Verdict};
pub use error::{
    CatalogError, CollectionError, ConfigError, SecurityError, SensorError, SentinelError,
    StatsError,
};
pub use pipeline::{Pipeline, TickReport};
pub use sensor::{Reading, Sensor, SensorCatalog, SensorConfig, SensorFactory, SensorId};
pub use stats::{BatchStats, compute_stats, compute_stats_scalar};
