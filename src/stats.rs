//! Batch statistics.
//!
//! [`compute_stats`] is the production path: it accumulates into fixed-width
//! lanes over `chunks_exact`, which the compiler lowers to SIMD adds.
//! [`compute_stats_scalar`] is the plain two-pass reference kept for
//! verification. Both report the population standard deviation.
//!
//! Both paths work on values divided by a power of two near the largest
//! magnitude. The division is exact, and squared deviations stay small, so
//! batches near `f64::MAX` do not overflow to infinity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::StatsError;
use crate::metrics;

const LANES: usize = 8;

/// Relative tolerance between the vectorized and scalar paths.
pub const AGREEMENT_EPSILON: f64 = 1e-9;

const EXPONENT_MASK: u64 = 0x7ff0_0000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

fn check(values: &[f64]) -> Result<(), StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyBatch);
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite { index });
    }
    Ok(())
}

/// Largest magnitude in the batch.
fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
}

/// Power of two at or below the largest magnitude; 1 for all-zero or
/// subnormal batches.
fn scale_of(values: &[f64]) -> f64 {
    let scale = f64::from_bits(max_abs(values).to_bits() & EXPONENT_MASK);
    if scale == 0.0 { 1.0 } else { scale }
}

#[inline]
fn lane_sum(values: &[f64], f: impl Fn(f64) -> f64) -> f64 {
    let mut acc = [0.0f64; LANES];
    let chunks = values.chunks_exact(LANES);
    let tail = chunks.remainder();

    for chunk in chunks {
        for (a, &v) in acc.iter_mut().zip(chunk) {
            *a += f(v);
        }
    }

    // Pairwise reduction of the lanes.
    let mut width = LANES;
    while width > 1 {
        width /= 2;
        for i in 0..width {
            acc[i] += acc[i + width];
        }
    }
    tail.iter().fold(acc[0], |sum, &v| sum + f(v))
}

/// Mean and population standard deviation, vectorized.
pub fn compute_stats(values: &[f64]) -> Result<BatchStats, StatsError> {
    check(values)?;
    let n = values.len() as f64;
    let scale = scale_of(values);

    let mean = lane_sum(values, |v| v / scale) / n;
    let variance = lane_sum(values, |v| {
        let d = v / scale - mean;
        d * d
    }) / n;

    Ok(BatchStats {
        count: values.len(),
        mean: mean * scale,
        std_dev: variance.sqrt() * scale,
    })
}

/// Reference implementation: one element at a time.
pub fn compute_stats_scalar(values: &[f64]) -> Result<BatchStats, StatsError> {
    check(values)?;
    let n = values.len() as f64;
    let scale = scale_of(values);

    let mut sum = 0.0;
    for v in values {
        sum += v / scale;
    }
    let mean = sum / n;

    let mut squares = 0.0;
    for v in values {
        let d = v / scale - mean;
        squares += d * d;
    }

    Ok(BatchStats {
        count: values.len(),
        mean: mean * scale,
        std_dev: (squares / n).sqrt() * scale,
    })
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    a == b || (a - b).abs() <= tolerance
}

/// Whether two results agree within [`AGREEMENT_EPSILON`] relative to the
/// larger of `scale` (the largest magnitude in the batch) and the compared
/// values themselves. There is no absolute floor, so sub-unit batches are held
/// to the same relative precision as large ones.
pub fn stats_agree(a: &BatchStats, b: &BatchStats, scale: f64) -> bool {
    let magnitude = scale
        .abs()
        .max(a.mean.abs())
        .max(b.mean.abs())
        .max(a.std_dev)
        .max(b.std_dev);
    let tolerance = AGREEMENT_EPSILON * magnitude;
    a.count == b.count
        && close(a.mean, b.mean, tolerance)
        && close(a.std_dev, b.std_dev, tolerance)
}

/// Run both paths over `values` and compare.
pub fn agrees_with_reference(values: &[f64]) -> Result<bool, StatsError> {
    let fast = compute_stats(values)?;
    let reference = compute_stats_scalar(values)?;
    Ok(stats_agree(&fast, &reference, max_abs(values)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingSnapshot {
    pub count: u64,
    pub total: Duration,
    pub last: Duration,
}

/// Timing wrapper around [`compute_stats`]. Instrumentation only.
#[derive(Debug, Default)]
pub struct TimedStats {
    count: AtomicU64,
    total_ns: AtomicU64,
    last_ns: AtomicU64,
}

impl TimedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&self, values: &[f64]) -> Result<BatchStats, StatsError> {
        let start = Instant::now();
        let result = compute_stats(values);
        let elapsed = start.elapsed();

        let ns = elapsed.as_nanos() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.last_ns.store(ns, Ordering::Relaxed);
        metrics::STATS_DURATION.observe(elapsed.as_secs_f64());

        result
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.total_ns.load(Ordering::Relaxed)),
            last: Duration::from_nanos(self.last_ns.load(Ordering::Relaxed)),
        }
    }
}

/// Buffers values until a full batch is available.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    buffer: Vec<f64>,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once the buffer holds a full batch.
    pub fn push(&mut self, value: f64) -> bool {
        self.buffer.push(value);
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.len() >= self.batch_size
    }

    /// Compute stats over the buffered values and clear the buffer.
    pub fn flush(&mut self, timer: &TimedStats) -> Result<BatchStats, StatsError> {
        let result = timer.compute(&self.buffer);
        self.buffer.clear();
        result
    }
}
