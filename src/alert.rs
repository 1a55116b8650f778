//! Alerts and the encrypted alert vault.
//!
//! Each alert is serialized, hashed, wrapped with its digest and encrypted
//! before it touches disk: one file per alert at
//! `<dir>/<sanitized sensor id>_<timestamp>.enc`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{AnomalyResult, Severity};
use crate::error::SecurityError;
use crate::metrics;
use crate::security::{AlertKey, decrypt, encrypt, sanitize_filename, sha256_hex};
use crate::sensor::SensorId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub sensor_id: SensorId,
    pub timestamp: u64,
    pub value: f64,
    pub severity: Severity,
    pub score: f64,
    pub strategy: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// `None` unless the result is anomalous.
    pub fn from_result(result: &AnomalyResult) -> Option<Self> {
        if !result.is_anomalous() {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            sensor_id: result.sensor_id.clone(),
            timestamp: result.timestamp,
            value: result.value,
            severity: result.severity,
            score: result.score,
            strategy: result.strategy.clone(),
            detail: result.detail.clone(),
            raised_at: Utc::now(),
        })
    }
}

/// Plaintext layout inside an `.enc` artifact.
#[derive(Serialize, Deserialize)]
struct Envelope {
    alert: String,
    sha256: String,
}

pub struct AlertVault {
    dir: PathBuf,
    key: AlertKey,
}

impl AlertVault {
    pub fn new(dir: impl Into<PathBuf>, key: AlertKey) -> Self {
        Self {
            dir: dir.into(),
            key,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an alert will be written to.
    pub fn path_for(&self, alert: &Alert) -> Result<PathBuf, SecurityError> {
        let stem = sanitize_filename(alert.sensor_id.as_str())?;
        Ok(self.dir.join(format!("{}_{}.enc", stem, alert.timestamp)))
    }

    /// Hash and encrypt an alert.
    pub fn seal(&self, alert: &Alert) -> Result<Vec<u8>, SecurityError> {
        let body = serde_json::to_string(alert)?;
        let envelope = Envelope {
            sha256: sha256_hex(body.as_bytes()),
            alert: body,
        };
        encrypt(&serde_json::to_vec(&envelope)?, &self.key)
    }

    /// Decrypt and verify a sealed alert.
    pub fn unseal(&self, sealed: &[u8]) -> Result<Alert, SecurityError> {
        let plaintext = decrypt(sealed, &self.key)?;
        let envelope: Envelope = serde_json::from_slice(&plaintext)?;
        if sha256_hex(envelope.alert.as_bytes()) != envelope.sha256 {
            return Err(SecurityError::Integrity);
        }
        Ok(serde_json::from_str(&envelope.alert)?)
    }

    pub fn persist(&self, alert: &Alert) -> Result<PathBuf, SecurityError> {
        let path = self.path_for(alert)?;
        let sealed = self.seal(alert)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, sealed)?;

        metrics::ALERTS_PERSISTED.inc();
        info!(
            alert = %alert.id,
            sensor = %alert.sensor_id,
            path = %path.display(),
            "Alert sealed."
        );
        Ok(path)
    }

    /// Persist each alert independently; one failure does not stop the rest.
    pub fn persist_all(&self, alerts: &[Alert]) -> Vec<Result<PathBuf, SecurityError>> {
        alerts
            .iter()
            .map(|alert| {
                let result = self.persist(alert);
                if let Err(e) = &result {
                    warn!(
                        alert = %alert.id,
                        sensor = %alert.sensor_id,
                        error = %e,
                        "Alert persistence failed."
                    );
                }
                result
            })
            .collect()
    }

    pub fn open(&self, path: impl AsRef<Path>) -> Result<Alert, SecurityError> {
        let sealed = fs::read(path)?;
        self.unseal(&sealed)
    }
}
