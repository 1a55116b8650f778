use crate::algo::{DetectionStrategy, Window};
use crate::config::Settings;
use crate::engine::{AnomalyResult, Severity};
use crate::sensor::Reading;

/// Fixed band `[threshold_low, threshold_high]`. Ignores the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdStrategy;

impl DetectionStrategy for ThresholdStrategy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn evaluate(&self, _window: &Window, reading: &Reading, settings: &Settings) -> AnomalyResult {
        let (low, high) = (settings.threshold_low, settings.threshold_high);
        let width = (high - low).max(f64::EPSILON);
        let value = reading.value;

        let overshoot = if value < low {
            low - value
        } else if value > high {
            value - high
        } else {
            return AnomalyResult::normal(
                reading,
                self.name(),
                0.0,
                format!("{:.3} within [{}, {}]", value, low, high),
            );
        };

        // Fraction of the band width by which the value escaped it.
        let score = overshoot / width;
        AnomalyResult::anomalous(
            reading,
            self.name(),
            score,
            Severity::from_excess(1.0 + score * 10.0),
            format!("{:.3} outside [{}, {}]", value, low, high),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Verdict;
    use crate::sensor::Unit;

    fn reading(value: f64) -> Reading {
        Reading {
            sensor_id: "t".into(),
            timestamp: 1,
            value,
            unit: Unit::Kilopascal,
        }
    }

    fn bounds(low: f64, high: f64) -> Settings {
        Settings {
            threshold_low: low,
            threshold_high: high,
            ..Settings::default()
        }
    }

    #[test]
    fn test_band() {
        let window = Window::new(4);

        let outside = ThresholdStrategy.evaluate(&window, &reading(100.0), &bounds(0.0, 20.0));
        assert_eq!(outside.verdict, Verdict::Anomalous);

        let inside = ThresholdStrategy.evaluate(&window, &reading(100.0), &bounds(0.0, 200.0));
        assert_eq!(inside.verdict, Verdict::Normal);

        let below = ThresholdStrategy.evaluate(&window, &reading(-0.5), &bounds(0.0, 200.0));
        assert_eq!(below.verdict, Verdict::Anomalous);
    }

    #[test]
    fn test_edges_are_inclusive() {
        let window = Window::new(4);
        let settings = bounds(0.0, 20.0);
        assert!(!ThresholdStrategy.evaluate(&window, &reading(0.0), &settings).is_anomalous());
        assert!(!ThresholdStrategy.evaluate(&window, &reading(20.0), &settings).is_anomalous());
    }
}
