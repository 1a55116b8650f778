//! Process-wide configuration.
//!
//! There is exactly one [`Configuration`] per process. It is created either by an
//! explicit call to [`init`] at startup or lazily with defaults by the first
//! [`get_config`]. Afterwards the only way to change it is
//! [`Configuration::reconfigure`], which validates the merged settings and swaps
//! them in as a whole. Readers take an `Arc<Settings>` snapshot, so a tick in
//! progress never observes a half-applied change.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::algo::StrategyKind;
use crate::error::ConfigError;

static GLOBAL: OnceCell<Configuration> = OnceCell::new();

/// Tunables for collection, statistics and detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Readings kept per sensor as detection context
    pub window_size: usize,
    /// Z-Score above which a reading is anomalous
    pub zscore_cutoff: f64,
    /// Lower bound for the threshold strategy
    pub threshold_low: f64,
    /// Upper bound for the threshold strategy
    pub threshold_high: f64,
    /// Values accumulated before batch statistics are emitted
    pub batch_size: usize,
    /// Active strategy name ("zscore" or "threshold")
    pub strategy: String,
    /// Minimum prior readings before the Z-Score strategy flags anything
    pub min_history: usize,
    /// Per-sensor poll deadline
    pub poll_timeout_ms: u64,
    /// Pause between ticks
    pub poll_interval_ms: u64,
    /// Fleet size built by the entry point
    pub max_sensors: usize,
    /// Ticks run by the entry point
    pub ticks: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window_size: 20,
            zscore_cutoff: 2.5,
            threshold_low: 0.0,
            threshold_high: 100.0,
            batch_size: 100,
            strategy: "zscore".to_string(),
            min_history: 1,
            poll_timeout_ms: 200,
            poll_interval_ms: 500,
            max_sensors: 50,
            ticks: 10,
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parsed form of [`Settings::strategy`].
    pub fn strategy_kind(&self) -> Result<StrategyKind, ConfigError> {
        self.strategy.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::invalid("window_size", "must be positive"));
        }
        if !self.zscore_cutoff.is_finite() || self.zscore_cutoff <= 0.0 {
            return Err(ConfigError::invalid(
                "zscore_cutoff",
                format!("must be a positive number, got {}", self.zscore_cutoff),
            ));
        }
        if !self.threshold_low.is_finite() || !self.threshold_high.is_finite() {
            return Err(ConfigError::invalid("threshold", "bounds must be finite"));
        }
        if self.threshold_low >= self.threshold_high {
            return Err(ConfigError::invalid(
                "threshold",
                format!(
                    "low ({}) must be below high ({})",
                    self.threshold_low, self.threshold_high
                ),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be positive"));
        }
        if self.min_history == 0 {
            return Err(ConfigError::invalid("min_history", "must be positive"));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::invalid("poll_timeout_ms", "must be positive"));
        }
        if self.max_sensors == 0 {
            return Err(ConfigError::invalid("max_sensors", "must be positive"));
        }
        self.strategy_kind()?;
        Ok(())
    }
}

/// Partial update for [`Configuration::reconfigure`]. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsUpdate {
    pub window_size: Option<usize>,
    pub zscore_cutoff: Option<f64>,
    pub threshold_low: Option<f64>,
    pub threshold_high: Option<f64>,
    pub batch_size: Option<usize>,
    pub strategy: Option<String>,
    pub min_history: Option<usize>,
    pub poll_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub max_sensors: Option<usize>,
    pub ticks: Option<u64>,
}

impl SettingsUpdate {
    fn apply_to(self, mut settings: Settings) -> Settings {
        if let Some(v) = self.window_size {
            settings.window_size = v;
        }
        if let Some(v) = self.zscore_cutoff {
            settings.zscore_cutoff = v;
        }
        if let Some(v) = self.threshold_low {
            settings.threshold_low = v;
        }
        if let Some(v) = self.threshold_high {
            settings.threshold_high = v;
        }
        if let Some(v) = self.batch_size {
            settings.batch_size = v;
        }
        if let Some(v) = self.strategy {
            settings.strategy = v;
        }
        if let Some(v) = self.min_history {
            settings.min_history = v;
        }
        if let Some(v) = self.poll_timeout_ms {
            settings.poll_timeout_ms = v;
        }
        if let Some(v) = self.poll_interval_ms {
            settings.poll_interval_ms = v;
        }
        if let Some(v) = self.max_sensors {
            settings.max_sensors = v;
        }
        if let Some(v) = self.ticks {
            settings.ticks = v;
        }
        settings
    }
}

#[derive(Debug)]
pub struct Configuration {
    current: RwLock<Arc<Settings>>,
}

impl Configuration {
    /// Standalone instance, outside the process-wide slot.
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(settings)),
        })
    }

    pub fn settings(&self) -> Arc<Settings> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Apply `update` all-or-nothing. Only safe between ticks.
    pub fn reconfigure(&self, update: SettingsUpdate) -> Result<Arc<Settings>, ConfigError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let merged = update.apply_to(Settings::clone(&guard));
        merged.validate()?;

        let merged = Arc::new(merged);
        *guard = Arc::clone(&merged);
        info!(
            window_size = merged.window_size,
            strategy = %merged.strategy,
            cutoff = merged.zscore_cutoff,
            "Configuration updated."
        );
        Ok(merged)
    }
}

/// Initialize the process-wide configuration. May succeed only once.
pub fn init(settings: Settings) -> Result<&'static Configuration, ConfigError> {
    let config = Configuration::new(settings)?;
    GLOBAL
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    GLOBAL.get().ok_or(ConfigError::AlreadyInitialized)
}

/// The process-wide configuration, created with defaults if [`init`] never ran.
pub fn get_config() -> &'static Configuration {
    GLOBAL.get_or_init(|| Configuration {
        current: RwLock::new(Arc::new(Settings::default())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_identity() {
        let a = get_config();
        let b = get_config();
        assert!(std::ptr::eq(a, b));
        assert!(Arc::ptr_eq(&a.settings(), &b.settings()));
    }

    #[test]
    fn test_second_init_rejected() {
        let _ = get_config();
        assert_eq!(
            init(Settings::default()).unwrap_err(),
            ConfigError::AlreadyInitialized
        );
    }

    #[test]
    fn test_defaults_are_valid() {
        let defaults = Settings::default();
        assert!(defaults.validate().is_ok());
        // One prior reading is enough for the flat-window rule to apply.
        assert_eq!(defaults.min_history, 1);
    }

    #[test]
    fn test_reconfigure_applies_fields() {
        let config = Configuration::new(Settings::default()).unwrap();
        let updated = config
            .reconfigure(SettingsUpdate {
                window_size: Some(8),
                strategy: Some("threshold".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(updated.window_size, 8);
        assert_eq!(updated.strategy, "threshold");
        assert_eq!(config.settings().zscore_cutoff, 2.5);
    }

    #[test]
    fn test_reconfigure_is_all_or_nothing() {
        let config = Configuration::new(Settings::default()).unwrap();
        let before = config.settings();

        let err = config
            .reconfigure(SettingsUpdate {
                window_size: Some(50),
                zscore_cutoff: Some(0.0),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { field: "zscore_cutoff", .. }));
        assert_eq!(*config.settings(), *before);
    }

    #[test]
    fn test_reconfigure_rejects_bad_values() {
        let config = Configuration::new(Settings::default()).unwrap();

        let zero_window = SettingsUpdate {
            window_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.reconfigure(zero_window),
            Err(ConfigError::Invalid { field: "window_size", .. })
        ));

        let inverted = SettingsUpdate {
            threshold_low: Some(10.0),
            threshold_high: Some(5.0),
            ..Default::default()
        };
        assert!(config.reconfigure(inverted).is_err());

        let unknown = SettingsUpdate {
            strategy: Some("isolation-forest".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.reconfigure(unknown),
            Err(ConfigError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn test_json_overrides() {
        let settings = Settings::from_json_str(r#"{"window_size": 5, "strategy": "threshold"}"#)
            .unwrap();
        assert_eq!(settings.window_size, 5);
        assert_eq!(settings.batch_size, 100);

        assert!(matches!(
            Settings::from_json_str(r#"{"windowsize": 5}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(Settings::from_json_str(r#"{"zscore_cutoff": -1.0}"#).is_err());
    }
}
