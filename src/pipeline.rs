//! One tick of collect -> statistics -> detect -> alert.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::alert::Alert;
use crate::cache::SensorCache;
use crate::collector::{Batch, Collector};
use crate::config::Settings;
use crate::engine::{AnomalyResult, DetectionEngine};
use crate::error::ConfigError;
use crate::sensor::{Sensor, SensorId};
use crate::stats::{BatchAccumulator, BatchStats, TimedStats, TimingSnapshot};

/// Everything produced by one tick.
#[derive(Debug)]
pub struct TickReport {
    pub batch: Batch,
    /// One entry per batch the accumulator filled this tick, oldest first
    pub stats: Vec<BatchStats>,
    pub results: Vec<AnomalyResult>,
    pub alerts: Vec<Alert>,
}

impl TickReport {
    pub fn anomaly_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_anomalous()).count()
    }
}

pub struct Pipeline {
    cache: SensorCache,
    collector: Collector,
    engine: DetectionEngine,
    accumulator: BatchAccumulator,
    timer: TimedStats,
}

impl Pipeline {
    pub fn new(settings: Arc<Settings>) -> Result<Self, ConfigError> {
        Ok(Self {
            cache: SensorCache::new(),
            collector: Collector::from_settings(&settings),
            accumulator: BatchAccumulator::new(settings.batch_size),
            engine: DetectionEngine::new(settings)?,
            timer: TimedStats::new(),
        })
    }

    /// Track a sensor without taking ownership of it.
    pub fn register(&mut self, sensor: &Arc<dyn Sensor>) {
        self.cache.register(sensor);
    }

    pub fn cache(&self) -> &SensorCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SensorCache {
        &mut self.cache
    }

    /// Drop cache entries of released sensors along with their windows.
    /// Returns the number of cache entries removed.
    pub fn prune(&mut self) -> usize {
        let removed = self.cache.prune();
        let cache = &self.cache;
        let forgotten = self.engine.retain_sensors(|id| cache.contains(id));
        if removed > 0 || forgotten > 0 {
            info!(removed, forgotten, "Pruned departed sensors.");
        }
        removed
    }

    /// Stop tracking one sensor and discard its window.
    pub fn release(&mut self, id: &SensorId) -> bool {
        self.engine.forget(id);
        self.cache.release(id)
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn set_strategy(&mut self, name: &str) -> Result<(), ConfigError> {
        self.engine.set_strategy(name)
    }

    /// Adopt new settings. Call only between ticks.
    pub fn apply_settings(&mut self, settings: Arc<Settings>) -> Result<(), ConfigError> {
        self.engine.apply_settings(Arc::clone(&settings))?;
        self.collector.set_poll_timeout(settings.poll_timeout());
        self.accumulator.set_batch_size(settings.batch_size);
        Ok(())
    }

    pub fn stats_timing(&self) -> TimingSnapshot {
        self.timer.snapshot()
    }

    pub async fn tick(&mut self) -> TickReport {
        let sensors = self.cache.live_sensors();
        let batch = self.collector.poll_once(&sensors).await;
        drop(sensors);

        let mut stats = Vec::new();
        for value in batch.values() {
            if !self.accumulator.push(value) {
                continue;
            }
            match self.accumulator.flush(&self.timer) {
                Ok(s) => {
                    info!(
                        tick = batch.tick,
                        count = s.count,
                        mean = s.mean,
                        std = s.std_dev,
                        "Batch processed."
                    );
                    stats.push(s);
                }
                Err(e) => warn!(tick = batch.tick, error = %e, "Batch statistics failed."),
            }
        }

        let results = self.engine.process_batch(&batch);
        let alerts: Vec<Alert> = results.iter().filter_map(Alert::from_result).collect();

        debug!(
            tick = batch.tick,
            polled = batch.len(),
            readings = results.len(),
            anomalies = alerts.len(),
            "Tick complete."
        );

        TickReport {
            batch,
            stats,
            results,
            alerts,
        }
    }
}
