//! Z-Score strategy.
//!
//! Mean and population standard deviation are taken over the prior window only,
//! so an outlier cannot dilute its own score. A flat window (every value
//! identical) flags any value that differs from that level and passes an
//! identical one. Flatness is read from the values themselves, since the
//! computed std of a flat window need not be exactly zero.

use crate::algo::{DetectionStrategy, Window};
use crate::config::Settings;
use crate::engine::{AnomalyResult, Severity};
use crate::sensor::Reading;
use crate::stats::compute_stats;

#[derive(Debug, Clone, Copy, Default)]
pub struct ZScoreStrategy;

/// The common value of a window whose readings are all identical.
fn flat_level(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    values.iter().all(|&v| v == first).then_some(first)
}

impl DetectionStrategy for ZScoreStrategy {
    fn name(&self) -> &'static str {
        "zscore"
    }

    fn evaluate(&self, window: &Window, reading: &Reading, settings: &Settings) -> AnomalyResult {
        if window.len() < settings.min_history {
            return AnomalyResult::normal(
                reading,
                self.name(),
                0.0,
                format!("warming up ({}/{} readings)", window.len(), settings.min_history),
            );
        }

        let values = window.values();
        let stats = match compute_stats(&values) {
            Ok(stats) => stats,
            Err(e) => {
                let detail = format!("no baseline: {}", e);
                return AnomalyResult::normal(reading, self.name(), 0.0, detail);
            }
        };

        let level = flat_level(&values).or((stats.std_dev == 0.0).then_some(stats.mean));
        if let Some(level) = level {
            return if reading.value == level {
                let detail = format!("flat window at {:.3}", level);
                AnomalyResult::normal(reading, self.name(), 0.0, detail)
            } else {
                AnomalyResult::anomalous(
                    reading,
                    self.name(),
                    f64::MAX,
                    Severity::High,
                    format!(
                        "value {:.3} departs from flat window at {:.3}",
                        reading.value, level
                    ),
                )
            };
        }

        let cutoff = settings.zscore_cutoff;
        let z = (reading.value - stats.mean).abs() / stats.std_dev;
        if z > cutoff {
            AnomalyResult::anomalous(
                reading,
                self.name(),
                z,
                Severity::from_excess(z / cutoff),
                format!(
                    "z={:.2} exceeds cutoff {:.2} (mean={:.3}, std={:.3})",
                    z, cutoff, stats.mean, stats.std_dev
                ),
            )
        } else {
            AnomalyResult::normal(reading, self.name(), z, format!("z={:.2}", z))
        }
    }
}
