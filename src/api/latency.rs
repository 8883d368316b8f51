//! In-memory latency histogram for backend fetches.
//! Records the wall time of every polling attempt, successful or not.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;

/// Shared fetch latency. Pollers record, API reads.
/// Values stored in microseconds.
pub struct FetchLatency {
    inner: Option<Mutex<Histogram<u64>>>,
}

impl FetchLatency {
    /// Tracks 1us to 100s, 3 significant figures.
    pub fn new() -> Self {
        Self {
            inner: Histogram::new_with_bounds(1, 100_000_000, 3).ok().map(Mutex::new),
        }
    }

    fn record_us(&self, us: u64) {
        if let Some(Ok(mut h)) = self.inner.as_ref().map(Mutex::lock) {
            h.saturating_record(us.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    /// (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles_ms(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        let Some(Ok(h)) = self.inner.as_ref().map(Mutex::lock) else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1_000.0);
        (ms(0.5), ms(0.95), ms(0.99))
    }
}

impl Default for FetchLatency {
    fn default() -> Self {
        Self::new()
    }
}
