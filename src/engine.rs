use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::algo::{DetectionStrategy, StrategyKind, Window};
use crate::collector::Batch;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::metrics;
use crate::sensor::{Reading, SensorId};

// --- Core Abstractions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Normal,
    Anomalous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Grade an anomaly by how many times its score exceeds the limit.
    pub fn from_excess(ratio: f64) -> Self {
        if ratio >= 4.0 {
            Severity::High
        } else if ratio >= 2.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Verdict for one reading of one sensor in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub sensor_id: SensorId,
    pub timestamp: u64,
    pub value: f64,
    pub verdict: Verdict,
    pub severity: Severity,
    /// Strategy-specific magnitude (z-score, band overshoot)
    pub score: f64,
    pub strategy: String,
    pub detail: String,
}

impl AnomalyResult {
    pub fn normal(reading: &Reading, strategy: &str, score: f64, detail: String) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            timestamp: reading.timestamp,
            value: reading.value,
            verdict: Verdict::Normal,
            severity: Severity::None,
            score,
            strategy: strategy.to_string(),
            detail,
        }
    }

    pub fn anomalous(
        reading: &Reading,
        strategy: &str,
        score: f64,
        severity: Severity,
        detail: String,
    ) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            timestamp: reading.timestamp,
            value: reading.value,
            verdict: Verdict::Anomalous,
            severity,
            score,
            strategy: strategy.to_string(),
            detail,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        self.verdict == Verdict::Anomalous
    }
}

// --- The Engine ---

/// Per-sensor windows plus the active strategy.
///
/// Switching strategies swaps only the evaluator; windows are kept as they are.
pub struct DetectionEngine {
    windows: HashMap<SensorId, Window>,
    strategy: Box<dyn DetectionStrategy>,
    settings: Arc<Settings>,
    event_count: u64,
}

impl DetectionEngine {
    pub fn new(settings: Arc<Settings>) -> Result<Self, ConfigError> {
        settings.validate()?;
        let strategy = settings.strategy_kind()?.build();
        Ok(Self {
            windows: HashMap::new(),
            strategy,
            settings,
            event_count: 0,
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Switch the active strategy. Unknown names fail here, not at evaluation.
    pub fn set_strategy(&mut self, name: &str) -> Result<(), ConfigError> {
        let kind: StrategyKind = name.parse()?;
        let previous = self.strategy.name();
        self.strategy = kind.build();
        info!(
            from = previous,
            to = kind.name(),
            windows = self.windows.len(),
            "Strategy switched."
        );
        Ok(())
    }

    /// Adopt new settings between ticks. Shrinks windows from the oldest end.
    pub fn apply_settings(&mut self, settings: Arc<Settings>) -> Result<(), ConfigError> {
        settings.validate()?;
        let kind = settings.strategy_kind()?;
        if kind.name() != self.strategy.name() {
            self.set_strategy(kind.name())?;
        }
        if settings.window_size != self.settings.window_size {
            for window in self.windows.values_mut() {
                window.resize(settings.window_size);
            }
        }
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn window(&self, id: &SensorId) -> Option<&Window> {
        self.windows.get(id)
    }

    pub fn tracked_sensors(&self) -> usize {
        self.windows.len()
    }

    /// Drop the window of a sensor that left the fleet.
    pub fn forget(&mut self, id: &SensorId) -> Option<Window> {
        self.windows.remove(id)
    }

    /// Keep only the windows of sensors for which `keep` holds. Returns how many
    /// were dropped.
    pub fn retain_sensors(&mut self, mut keep: impl FnMut(&SensorId) -> bool) -> usize {
        let before = self.windows.len();
        self.windows.retain(|id, _| keep(id));
        before - self.windows.len()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Evaluate against the current window, then push the reading into it.
    pub fn evaluate(&mut self, reading: &Reading) -> AnomalyResult {
        self.event_count += 1;
        let window = self
            .windows
            .entry(reading.sensor_id.clone())
            .or_insert_with(|| Window::new(self.settings.window_size));

        let result = self.strategy.evaluate(window, reading, &self.settings);
        window.push(reading.clone());

        if result.is_anomalous() {
            metrics::ANOMALY_TOTAL.inc();
            warn!(
                sensor = %result.sensor_id,
                value = result.value,
                score = result.score,
                severity = ?result.severity,
                strategy = result.strategy.as_str(),
                "ANOMALY"
            );
        }
        result
    }

    /// One result per successful reading in the batch, in sensor-id order.
    pub fn process_batch(&mut self, batch: &Batch) -> Vec<AnomalyResult> {
        batch.readings().map(|r| self.evaluate(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Unit;

    fn reading(id: &str, ts: u64, value: f64) -> Reading {
        Reading {
            sensor_id: id.into(),
            timestamp: ts,
            value,
            unit: Unit::Celsius,
        }
    }

    fn engine(strategy: &str) -> DetectionEngine {
        let settings = Settings {
            window_size: 4,
            zscore_cutoff: 2.0,
            threshold_low: 0.0,
            threshold_high: 20.0,
            strategy: strategy.to_string(),
            ..Settings::default()
        };
        DetectionEngine::new(Arc::new(settings)).unwrap()
    }

    #[test]
    fn test_unknown_strategy_fails_fast() {
        let mut engine = engine("zscore");
        assert!(matches!(
            engine.set_strategy("lstm"),
            Err(ConfigError::UnknownStrategy { .. })
        ));
        assert_eq!(engine.strategy_name(), "zscore");

        let settings = Settings {
            strategy: "lstm".into(),
            ..Settings::default()
        };
        assert!(DetectionEngine::new(Arc::new(settings)).is_err());
    }

    #[test]
    fn test_outlier_detected_before_it_enters_window() {
        let mut engine = engine("zscore");
        for (i, v) in [10.0, 12.0, 9.0, 11.0].into_iter().enumerate() {
            engine.evaluate(&reading("s", i as u64, v));
        }

        let result = engine.evaluate(&reading("s", 4, 100.0));
        assert!(result.is_anomalous());

        let window = engine.window(&"s".into()).unwrap();
        assert_eq!(window.values(), vec![12.0, 9.0, 11.0, 100.0]);
    }

    #[test]
    fn test_strategy_switch_preserves_windows() {
        let mut engine = engine("zscore");
        for (i, v) in [10.0, 12.0, 9.0].into_iter().enumerate() {
            engine.evaluate(&reading("s", i as u64, v));
        }
        let before = engine.window(&"s".into()).unwrap().values();

        engine.set_strategy("threshold").unwrap();
        assert_eq!(engine.window(&"s".into()).unwrap().values(), before);

        let result = engine.evaluate(&reading("s", 3, 11.0));
        assert_eq!(result.strategy, "threshold");
        assert!(!result.is_anomalous());
        assert_eq!(
            engine.window(&"s".into()).unwrap().values(),
            vec![10.0, 12.0, 9.0, 11.0]
        );
    }

    #[test]
    fn test_windows_are_per_sensor_and_bounded() {
        let mut engine = engine("threshold");
        for i in 0..10 {
            engine.evaluate(&reading("a", i, 1.0));
        }
        engine.evaluate(&reading("b", 0, 2.0));

        assert_eq!(engine.window(&"a".into()).unwrap().len(), 4);
        assert_eq!(engine.window(&"b".into()).unwrap().len(), 1);
        assert_eq!(engine.tracked_sensors(), 2);
        assert_eq!(engine.event_count(), 11);
    }

    #[test]
    fn test_departed_sensors_are_forgotten() {
        let mut engine = engine("threshold");
        for id in ["a", "b", "c"] {
            engine.evaluate(&reading(id, 0, 1.0));
        }

        assert_eq!(engine.forget(&"a".into()).map(|w| w.len()), Some(1));
        assert!(engine.forget(&"a".into()).is_none());

        let dropped = engine.retain_sensors(|id| id.as_str() == "c");
        assert_eq!(dropped, 1);
        assert_eq!(engine.tracked_sensors(), 1);
        assert!(engine.window(&"c".into()).is_some());
    }

    #[test]
    fn test_apply_settings_shrinks_windows() {
        let mut engine = engine("zscore");
        for i in 0..4 {
            engine.evaluate(&reading("a", i, i as f64));
        }

        let smaller = Settings {
            window_size: 2,
            strategy: "threshold".into(),
            ..engine.settings().clone()
        };
        engine.apply_settings(Arc::new(smaller)).unwrap();

        assert_eq!(engine.window(&"a".into()).unwrap().values(), vec![2.0, 3.0]);
        assert_eq!(engine.strategy_name(), "threshold");

        engine.evaluate(&reading("a", 4, 4.0));
        assert_eq!(engine.window(&"a".into()).unwrap().len(), 2);
    }
}
