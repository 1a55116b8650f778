//! Simulated sensor variants.
//!
//! Each variant draws from a normal distribution around its own baseline and
//! occasionally emits a spike. Polls sleep for a random latency before producing
//! a value; all state changes happen after that sleep, so a poll cancelled by a
//! timeout leaves the sensor untouched.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::SensorError;
use crate::sensor::{Reading, Sensor, SensorConfig, SensorId, Unit};

/// Tagged sensor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Pressure,
    Vibration,
}

impl SensorKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Pressure => "pressure",
            SensorKind::Vibration => "vibration",
        }
    }

    pub fn unit(&self) -> Unit {
        match self {
            SensorKind::Temperature => Unit::Celsius,
            SensorKind::Pressure => Unit::Kilopascal,
            SensorKind::Vibration => Unit::MillimetersPerSecond,
        }
    }

    /// (mean, std_dev) of normal operation.
    fn baseline(&self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => (22.0, 1.5),
            SensorKind::Pressure => (101.3, 0.8),
            SensorKind::Vibration => (4.0, 1.0),
        }
    }

    /// Multiplier applied to the baseline mean for a spike.
    fn spike_factor(&self) -> f64 {
        match self {
            SensorKind::Temperature => 3.0,
            SensorKind::Pressure => 1.6,
            SensorKind::Vibration => 12.0,
        }
    }
}

struct SensorState {
    rng: StdRng,
    calibrated: bool,
    last_timestamp: u64,
}

pub struct SimulatedSensor {
    id: SensorId,
    kind: SensorKind,
    latency_ms: std::ops::Range<u64>,
    spike_probability: f64,
    state: Mutex<SensorState>,
}

impl SimulatedSensor {
    pub fn new(id: SensorId, kind: SensorKind, config: &SensorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            id,
            kind,
            latency_ms: config.latency_ms.clone(),
            spike_probability: spike_probability(config.spike_probability),
            state: Mutex::new(SensorState {
                rng,
                calibrated: false,
                last_timestamp: 0,
            }),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    fn latency(&self) -> Duration {
        if self.latency_ms.is_empty() {
            return Duration::from_millis(self.latency_ms.start);
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(state.rng.random_range(self.latency_ms.clone()))
    }
}

/// Probability usable by `random_bool`; NaN means no spikes.
fn spike_probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

// Constructors registered in the built-in catalog.

pub fn temperature(id: SensorId, config: &SensorConfig) -> Arc<dyn Sensor> {
    Arc::new(SimulatedSensor::new(id, SensorKind::Temperature, config))
}

pub fn pressure(id: SensorId, config: &SensorConfig) -> Arc<dyn Sensor> {
    Arc::new(SimulatedSensor::new(id, SensorKind::Pressure, config))
}

pub fn vibration(id: SensorId, config: &SensorConfig) -> Arc<dyn Sensor> {
    Arc::new(SimulatedSensor::new(id, SensorKind::Vibration, config))
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl Sensor for SimulatedSensor {
    fn id(&self) -> &SensorId {
        &self.id
    }

    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn unit(&self) -> Unit {
        self.kind.unit()
    }

    fn calibrate(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrated = true;
    }

    fn is_calibrated(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrated
    }

    async fn next_reading(&self) -> Result<Reading, SensorError> {
        if !self.is_calibrated() {
            return Err(SensorError::NotCalibrated(self.id.clone()));
        }

        tokio::time::sleep(self.latency()).await;

        // No suspension points past here.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (mean, std_dev) = self.kind.baseline();
        let value = if state.rng.random_bool(self.spike_probability) {
            mean * self.kind.spike_factor()
        } else {
            let z: f64 = state.rng.sample(StandardNormal);
            mean + std_dev * z
        };
        let timestamp = now_ns().max(state.last_timestamp + 1);
        state.last_timestamp = timestamp;

        Ok(Reading {
            sensor_id: self.id.clone(),
            timestamp,
            value,
            unit: self.kind.unit(),
        })
    }
}
