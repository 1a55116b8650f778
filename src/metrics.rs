//! Process-wide prometheus metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, TextEncoder};

pub static READINGS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("sentinel_readings_total", "Total readings collected").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static COLLECTION_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    let c = CounterVec::new(
        Opts::new("sentinel_collection_failures_total", "Failed polls by kind"),
        &["kind"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALY_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("sentinel_anomalies_total", "Total anomalies detected").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ALERTS_PERSISTED: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("sentinel_alerts_persisted_total", "Encrypted alerts written").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static STATS_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "sentinel_stats_duration_seconds",
        "Histogram of batch statistics latency",
    ))
    .unwrap();
    prometheus::register(Box::new(h.clone())).unwrap();
    h
});

/// Force registration so the first scrape sees every series.
pub fn init() {
    let _ = &*READINGS_TOTAL;
    let _ = &*COLLECTION_FAILURES;
    let _ = &*ANOMALY_TOTAL;
    let _ = &*ALERTS_PERSISTED;
    let _ = &*STATS_DURATION;
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_series() {
        init();
        ANOMALY_TOTAL.inc();
        let text = render();
        assert!(text.contains("sentinel_anomalies_total"));
        assert!(text.contains("sentinel_stats_duration_seconds"));
    }
}
