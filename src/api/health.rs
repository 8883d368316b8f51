//! Shared health state for the /health endpoint.
//! Updated by polling activations and the view registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::api::latency::FetchLatency;

/// Shared health metrics. Updated by pollers, read by API.
#[derive(Default)]
pub struct HealthState {
    /// Attempts whose response carried the success code.
    pub polls_ok: AtomicU64,
    /// Attempts that failed at transport, decode or envelope level.
    pub polls_failed: AtomicU64,
    /// Activations that stopped because their retry budget ran out.
    pub activations_exhausted: AtomicU64,
    /// Request-driven views currently polling.
    pub live_views: AtomicU64,
    /// Millisecond timestamp of the last successful poll (0 = none).
    pub last_success_at_ms: AtomicU64,
    pub latency: FetchLatency,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub activations_exhausted: u64,
    pub live_views: u64,
    pub last_success_at_ms: Option<u64>,
    pub fetch_p50_ms: Option<f64>,
    pub fetch_p95_ms: Option<f64>,
    pub fetch_p99_ms: Option<f64>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
        self.last_success_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exhausted(&self) {
        self.activations_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_live_views(&self, n: usize) {
        self.live_views.store(n as u64, Ordering::Relaxed);
    }

    pub fn polls_ok(&self) -> u64 {
        self.polls_ok.load(Ordering::Relaxed)
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }

    pub fn activations_exhausted(&self) -> u64 {
        self.activations_exhausted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_success_at_ms.load(Ordering::Relaxed);
        let (p50, p95, p99) = self.latency.percentiles_ms();
        HealthSnapshot {
            // Degraded until the first backend response lands.
            status: if last == 0 { "degraded" } else { "ok" },
            polls_ok: self.polls_ok(),
            polls_failed: self.polls_failed(),
            activations_exhausted: self.activations_exhausted(),
            live_views: self.live_views.load(Ordering::Relaxed),
            last_success_at_ms: (last != 0).then_some(last),
            fetch_p50_ms: p50,
            fetch_p95_ms: p95,
            fetch_p99_ms: p99,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_until_first_success() {
        let health = HealthState::new();
        health.record_failure();
        let snap = health.snapshot();
        assert_eq!(snap.status, "degraded");
        assert_eq!(snap.polls_failed, 1);
        assert!(snap.last_success_at_ms.is_none());

        health.record_success();
        let snap = health.snapshot();
        assert_eq!(snap.status, "ok");
        assert_eq!(snap.polls_ok, 1);
        assert!(snap.last_success_at_ms.is_some());
    }
}
