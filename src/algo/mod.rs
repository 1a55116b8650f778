pub mod threshold;
pub mod window;
pub mod zscore;

use std::fmt;
use std::str::FromStr;

use crate::config::Settings;
use crate::engine::AnomalyResult;
use crate::error::ConfigError;
use crate::sensor::Reading;

pub use threshold::ThresholdStrategy;
pub use window::Window;
pub use zscore::ZScoreStrategy;

/// A rule that judges one incoming reading against the sensor's prior window.
///
/// `window` never contains `reading`; the engine pushes only after evaluating.
pub trait DetectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, window: &Window, reading: &Reading, settings: &Settings) -> AnomalyResult;
}

/// Names accepted by configuration and `set_strategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    ZScore,
    Threshold,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::ZScore => "zscore",
            StrategyKind::Threshold => "threshold",
        }
    }

    pub fn build(&self) -> Box<dyn DetectionStrategy> {
        match self {
            StrategyKind::ZScore => Box::new(ZScoreStrategy),
            StrategyKind::Threshold => Box::new(ThresholdStrategy),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zscore" | "z-score" => Ok(StrategyKind::ZScore),
            "threshold" => Ok(StrategyKind::Threshold),
            _ => Err(ConfigError::UnknownStrategy {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names() {
        assert_eq!("zscore".parse::<StrategyKind>(), Ok(StrategyKind::ZScore));
        assert_eq!(" Threshold ".parse::<StrategyKind>(), Ok(StrategyKind::Threshold));
        assert_eq!(
            "median".parse::<StrategyKind>(),
            Err(ConfigError::UnknownStrategy { name: "median".into() })
        );
        assert_eq!(StrategyKind::Threshold.build().name(), "threshold");
    }
}
