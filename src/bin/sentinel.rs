use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, bounded};
use iot_sentinel::alert::{Alert, AlertVault};
use iot_sentinel::config::{self, Settings};
use iot_sentinel::error::SentinelError;
use iot_sentinel::metrics;
use iot_sentinel::pipeline::Pipeline;
use iot_sentinel::security::AlertKey;
use iot_sentinel::sensor::{SensorCatalog, SensorConfig, SensorFactory};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const ALERT_DIR: &str = "alerts";

// --- Persistence Layer ---

struct PersistenceManager;

impl PersistenceManager {
    fn spawn(rx: Receiver<Alert>, vault: AlertVault) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("sentinel-persistence".into())
            .spawn(move || {
                info!(dir = %vault.dir().display(), "Persistence manager active.");
                let mut written = 0u64;
                while let Ok(alert) = rx.recv() {
                    match vault.persist(&alert) {
                        Ok(_) => written += 1,
                        Err(e) => warn!(alert = %alert.id, error = %e, "Alert persistence failed."),
                    }
                }
                info!(written, "Persistence manager stopped.");
            })
    }
}

fn load_settings() -> Result<Settings, SentinelError> {
    match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "Loading settings.");
            Ok(Settings::from_json_file(path)?)
        }
        None => Ok(Settings::default()),
    }
}

async fn run() -> Result<(), SentinelError> {
    metrics::init();

    let configuration = config::init(load_settings()?)?;
    let settings = configuration.settings();
    info!(
        sensors = settings.max_sensors,
        window = settings.window_size,
        batch = settings.batch_size,
        strategy = %settings.strategy,
        "Starting sentinel."
    );

    let factory = SensorFactory::new(Arc::new(SensorCatalog::builtin()?));
    let fleet = factory.build_fleet(settings.max_sensors, &SensorConfig::default())?;

    let mut pipeline = Pipeline::new(Arc::clone(&settings))?;
    for sensor in &fleet {
        pipeline.register(sensor);
    }

    // Key lives for this run only; alerts from earlier runs are unreadable.
    let vault = AlertVault::new(ALERT_DIR, AlertKey::generate());
    let (alert_tx, alert_rx) = bounded::<Alert>(10_000);
    let persistence = PersistenceManager::spawn(alert_rx, vault)?;

    let mut interval = tokio::time::interval(settings.poll_interval());
    for _ in 0..settings.ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping early.");
                break;
            }
        }

        let report = pipeline.tick().await;
        info!(
            tick = report.batch.tick,
            readings = report.results.len(),
            failures = report.batch.failures().count(),
            anomalies = report.anomaly_count(),
            "Tick finished."
        );
        for alert in report.alerts {
            if alert_tx.try_send(alert).is_err() {
                warn!("Alert queue full, dropping alert.");
            }
        }
    }

    let timing = pipeline.stats_timing();
    info!(
        batches = timing.count,
        total_us = timing.total.as_micros() as u64,
        last_us = timing.last.as_micros() as u64,
        "Statistics timing."
    );

    info!(cached = pipeline.cache().size(), "Releasing fleet.");
    drop(fleet);
    let pruned = pipeline.prune();
    info!(
        pruned,
        cached = pipeline.cache().size(),
        windows = pipeline.engine().tracked_sensors(),
        "Cache pruned after release."
    );

    drop(alert_tx);
    if persistence.join().is_err() {
        error!("Persistence thread panicked.");
    }

    tracing::debug!("{}", metrics::render());
    info!("Run complete.");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Sentinel failed.");
        std::process::exit(1);
    }
}
