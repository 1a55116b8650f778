//! Concurrent per-sensor collection.
//!
//! One task per sensor, each behind its own timeout. The batch is complete once
//! every task has produced a reading or a typed error, so its wall time is
//! bounded by the slowest successful poll or the timeout, never by the sum.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::CollectionError;
use crate::metrics;
use crate::sensor::{Reading, Sensor, SensorId};

pub type PollOutcome = Result<Reading, CollectionError>;

/// Result of one tick, keyed by sensor identifier.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub tick: u64,
    entries: BTreeMap<SensorId, PollOutcome>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &SensorId) -> Option<&PollOutcome> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&SensorId, &PollOutcome)> {
        self.entries.iter()
    }

    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.entries.values().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SensorId, &CollectionError)> {
        self.entries
            .iter()
            .filter_map(|(id, o)| o.as_ref().err().map(|e| (id, e)))
    }

    pub fn values(&self) -> Vec<f64> {
        self.readings().map(|r| r.value).collect()
    }

    pub fn timeout_count(&self) -> usize {
        self.failures()
            .filter(|(_, e)| matches!(e, CollectionError::Timeout { .. }))
            .count()
    }
}

pub struct Collector {
    poll_timeout: Duration,
    ticks: u64,
}

impl Collector {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            ticks: 0,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.poll_timeout())
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn set_poll_timeout(&mut self, poll_timeout: Duration) {
        self.poll_timeout = poll_timeout;
    }

    /// Poll every sensor once, concurrently.
    pub async fn poll_once(&mut self, sensors: &[Arc<dyn Sensor>]) -> Batch {
        self.ticks += 1;
        let limit = self.poll_timeout;

        let handles: Vec<_> = sensors
            .iter()
            .map(|sensor| {
                let sensor = Arc::clone(sensor);
                let id = sensor.id().clone();
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(limit, sensor.next_reading()).await {
                        Ok(Ok(reading)) => Ok(reading),
                        Ok(Err(e)) => Err(CollectionError::Sensor(e)),
                        Err(_) => Err(CollectionError::Timeout { after: limit }),
                    }
                });
                (id, handle)
            })
            .collect();

        let mut entries = BTreeMap::new();
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(CollectionError::Panicked {
                    message: panic_message(e.into_panic()),
                }),
                Err(e) => Err(CollectionError::Panicked {
                    message: e.to_string(),
                }),
            };

            match &outcome {
                Ok(reading) => {
                    metrics::READINGS_TOTAL.inc();
                    debug!(
                        tick = self.ticks,
                        sensor = %id,
                        value = reading.value,
                        "Reading collected."
                    );
                }
                Err(e) => {
                    metrics::COLLECTION_FAILURES
                        .with_label_values(&[e.kind()])
                        .inc();
                    warn!(tick = self.ticks, sensor = %id, error = %e, "Poll failed.");
                }
            }
            entries.insert(id, outcome);
        }

        Batch {
            tick: self.ticks,
            entries,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::sensor::Unit;
    use async_trait::async_trait;

    enum Behaviour {
        Ok(f64),
        Fail,
        Hang,
        Panic,
    }

    struct ScriptedSensor {
        id: SensorId,
        behaviour: Behaviour,
    }

    fn scripted(id: &str, behaviour: Behaviour) -> Arc<dyn Sensor> {
        Arc::new(ScriptedSensor {
            id: id.into(),
            behaviour,
        })
    }

    #[async_trait]
    impl Sensor for ScriptedSensor {
        fn id(&self) -> &SensorId {
            &self.id
        }

        fn type_name(&self) -> &'static str {
            "scripted"
        }

        fn unit(&self) -> Unit {
            Unit::Celsius
        }

        fn calibrate(&self) {}

        fn is_calibrated(&self) -> bool {
            true
        }

        async fn next_reading(&self) -> Result<Reading, SensorError> {
            match self.behaviour {
                Behaviour::Ok(value) => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(Reading {
                        sensor_id: self.id.clone(),
                        timestamp: 1,
                        value,
                        unit: Unit::Celsius,
                    })
                }
                Behaviour::Fail => Err(SensorError::Fault {
                    sensor: self.id.clone(),
                    message: "bus error".into(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("poll should have been cancelled")
                }
                Behaviour::Panic => panic!("sensor exploded"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_are_isolated() {
        let sensors = vec![
            scripted("a", Behaviour::Ok(1.0)),
            scripted("b", Behaviour::Ok(2.0)),
            scripted("c", Behaviour::Fail),
            scripted("d", Behaviour::Hang),
            scripted("e", Behaviour::Ok(3.0)),
        ];
        let mut collector = Collector::new(Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        let batch = collector.poll_once(&sensors).await;

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.readings().count(), 3);
        assert_eq!(batch.timeout_count(), 1);
        assert!(matches!(
            batch.get(&"c".into()),
            Some(Err(CollectionError::Sensor(SensorError::Fault { .. })))
        ));
        assert!(matches!(
            batch.get(&"d".into()),
            Some(Err(CollectionError::Timeout { .. }))
        ));
        assert_eq!(batch.values(), vec![1.0, 2.0, 3.0]);
        // Bounded by the timeout, not the hanging sensor.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_run_concurrently() {
        let sensors: Vec<_> = (0..20)
            .map(|i| scripted(&format!("s{:02}", i), Behaviour::Ok(i as f64)))
            .collect();
        let mut collector = Collector::new(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        let batch = collector.poll_once(&sensors).await;

        assert_eq!(batch.readings().count(), 20);
        // 20 polls of 30ms each would take 600ms sequentially.
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_panicking_poll_becomes_entry() {
        let sensors = vec![
            scripted("ok", Behaviour::Ok(5.0)),
            scripted("boom", Behaviour::Panic),
        ];
        let mut collector = Collector::new(Duration::from_millis(500));
        let batch = collector.poll_once(&sensors).await;

        assert_eq!(batch.len(), 2);
        match batch.get(&"boom".into()) {
            Some(Err(CollectionError::Panicked { message })) => {
                assert!(message.contains("sensor exploded"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(batch.tick, 1);
    }
}
