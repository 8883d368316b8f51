use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::config::{CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_RETRIES};
use crate::error::{AppError, Result};
use crate::types::ApiResponse;

/// A response that carries its own success/failure code.
pub trait Envelope {
    fn check(&self) -> Result<()>;
}

impl<T> Envelope for ApiResponse<T> {
    fn check(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(AppError::Api {
                code: self.code,
                msg: self.msg.clone().unwrap_or_default(),
            })
        }
    }
}

const MIN_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Spacing of interval ticks.
    pub delay: Duration,
    /// Failed interval ticks tolerated before the activation stops.
    pub retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            retries: DEFAULT_POLL_RETRIES,
        }
    }
}

/// Remaining failures an activation may absorb on its interval path.
/// Owned by one activation; a new activation starts with a full budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(retries: u32) -> Self {
        Self { remaining: retries }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spend one retry. Returns what is left.
    pub fn consume(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOrigin {
    /// The call made as soon as the activation starts.
    Immediate,
    /// A call driven by the interval timer.
    Interval,
}

impl std::fmt::Display for TickOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickOrigin::Immediate => write!(f, "immediate"),
            TickOrigin::Interval => write!(f, "interval"),
        }
    }
}

/// One emission of an activation. Exactly one per completed tick.
#[derive(Debug)]
pub enum PollEvent<R> {
    Data(R),
    Failed { origin: TickOrigin, error: AppError },
}

enum Attempt {
    Delivered,
    Failed,
        /// Interval fetch returned the stop sentinel.
    Stopped,
    /// Consumer is gone or the activation was cancelled.
    Closed,
}

#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
impl Liveness {
    pub fn fixed(alive: bool) -> Self {
        Self(Arc::new(AtomicBool::new(alive)))
    }
}

/// Handle to a running activation. Dropping it cancels the activation:
/// the interval stops and no further event is emitted.
pub struct Activation {
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Activation {
    /// Shared view of this activation's liveness flag, for consumers that
    /// must drop events still buffered after cancellation.
    pub fn liveness(&self) -> Liveness {
        Liveness(Arc::clone(&self.alive))
    }

    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Polling Data Source: calls `fetch` once immediately, then every
/// `delay`, emitting each successful response on a channel.
///
/// `fetch` resolves to `Ok(Some(resp))` for a response, `Ok(None)` for the
/// stop sentinel, or `Err` on transport failure. A response whose embedded
/// code is not success counts as a failure. The sentinel only stops an
/// interval tick; on the immediate call it is a failure like any other.
/// Failures on the interval path spend the retry budget; the immediate call
/// never does. A zero `delay` is raised to one millisecond.
pub struct Poller<F> {
    name: String,
    config: PollConfig,
    fetch: F,
    health: Option<Arc<HealthState>>,
}

impl<F, Fut, R> Poller<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<R>>> + Send + 'static,
    R: Envelope + Send + 'static,
{
    pub fn new(name: impl Into<String>, fetch: F) -> Self {
        Self {
            name: name.into(),
            config: PollConfig::default(),
            fetch,
            health: None,
        }
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    /// Start the activation. Events arrive on the returned receiver until the
    /// budget is exhausted, the stop sentinel is seen, or the handle is dropped.
    pub fn spawn(self) -> (Activation, mpsc::Receiver<PollEvent<R>>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(self.run(tx, Arc::clone(&alive)));
        (Activation { alive, task }, rx)
    }

    async fn run(self, tx: mpsc::Sender<PollEvent<R>>, alive: Arc<AtomicBool>) {
        let start = tokio::time::Instant::now();
        let mut budget = RetryBudget::new(self.config.retries);

        if let Attempt::Closed = self.attempt(TickOrigin::Immediate, &tx, &alive).await {
            return;
        }

        let delay = self.config.delay.max(MIN_DELAY);
        let mut ticker = interval_at(start + delay, delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if budget.is_exhausted() {
                info!(view = %self.name, "Retry budget exhausted, polling stopped");
                if let Some(health) = &self.health {
                    health.inc_exhausted();
                }
                return;
            }

            ticker.tick().await;

            match self.attempt(TickOrigin::Interval, &tx, &alive).await {
                Attempt::Delivered => {}
                Attempt::Failed => {
                    let remaining = budget.consume();
                    debug!(view = %self.name, remaining, "Interval tick failed");
                }
                Attempt::Stopped | Attempt::Closed => return,
            }
        }
    }

    async fn attempt(
        &self,
        origin: TickOrigin,
        tx: &mpsc::Sender<PollEvent<R>>,
        alive: &AtomicBool,
    ) -> Attempt {
        let started = Instant::now();
        let outcome = (self.fetch)().await;
        if let Some(health) = &self.health {
            health.latency.record(started.elapsed());
        }

        if !alive.load(Ordering::Acquire) {
            return Attempt::Closed;
        }

        let checked = match outcome {
            Ok(None) if origin == TickOrigin::Immediate => {
                Err(AppError::Unavailable("initial fetch returned no response".to_string()))
            }
            Ok(None) => {
                info!(view = %self.name, origin = %origin, "Stop sentinel received, polling stopped");
                return Attempt::Stopped;
            }
            Ok(Some(resp)) => resp.check().map(|()| resp),
            Err(e) => Err(e),
        };

        match checked {
            Ok(resp) => {
                if let Some(health) = &self.health {
                    health.record_success();
                }
                if tx.send(PollEvent::Data(resp)).await.is_err() {
                    return Attempt::Closed;
                }
                Attempt::Delivered
            }
            Err(error) => {
                warn!(view = %self.name, origin = %origin, "Poll failed: {error}");
                if let Some(health) = &self.health {
                    health.record_failure();
                }
                if tx.send(PollEvent::Failed { origin, error }).await.is_err() {
                    return Attempt::Closed;
                }
                Attempt::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Ok,
        Code(i64),
        Reject,
        Stop,
    }

    fn response(code: i64) -> ApiResponse<u32> {
        ApiResponse {
            code,
            msg: Some("msg".to_string()),
            data: Some(7),
        }
    }

    /// A fetch that replays `script`, repeating its last step forever.
    fn scripted(
        script: Vec<Step>,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<Option<ApiResponse<u32>>>> + Send>>
           + Send
           + Sync
           + 'static {
        let script = Arc::new(script);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let step = script[n.min(script.len() - 1)];
            Box::pin(async move {
                match step {
                    Step::Ok => Ok(Some(response(200))),
                    Step::Code(code) => Ok(Some(response(code))),
                    Step::Reject => Err(AppError::Rpc("connection refused".to_string())),
                    Step::Stop => Ok(None),
                }
            })
        }
    }

    fn config(retries: u32) -> PollConfig {
        PollConfig {
            delay: Duration::from_secs(1),
            retries,
        }
    }

    async fn drain<R>(rx: &mut mpsc::Receiver<PollEvent<R>>) -> Vec<PollEvent<R>> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn always_rejecting_fetch_stops_after_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new("test", scripted(vec![Step::Reject], Arc::clone(&calls)))
            .with_config(config(3));
        let (_activation, mut rx) = poller.spawn();

        let events = drain(&mut rx).await;

        // Immediate call plus exactly three interval ticks.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events[0],
            PollEvent::Failed { origin: TickOrigin::Immediate, .. }
        ));
        assert!(events[1..]
            .iter()
            .all(|e| matches!(e, PollEvent::Failed { origin: TickOrigin::Interval, .. })));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_code_is_a_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new("test", scripted(vec![Step::Code(500)], Arc::clone(&calls)))
            .with_config(config(2));
        let (_activation, mut rx) = poller.spawn();

        let events = drain(&mut rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(events.iter().all(|e| matches!(
            e,
            PollEvent::Failed { error: AppError::Api { code: 500, .. }, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_failure_does_not_spend_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![Step::Reject, Step::Ok, Step::Reject];
        let poller = Poller::new("test", scripted(script, Arc::clone(&calls))).with_config(config(1));
        let (_activation, mut rx) = poller.spawn();

        let events = drain(&mut rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(events[0], PollEvent::Failed { origin: TickOrigin::Immediate, .. }));
        assert!(matches!(events[1], PollEvent::Data(_)));
        assert!(matches!(events[2], PollEvent::Failed { origin: TickOrigin::Interval, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn success_does_not_restore_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![Step::Ok, Step::Reject, Step::Ok, Step::Reject, Step::Ok];
        let poller = Poller::new("test", scripted(script, Arc::clone(&calls))).with_config(config(2));
        let (_activation, mut rx) = poller.spawn();

        let events = drain(&mut rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let kinds: Vec<bool> = events.iter().map(|e| matches!(e, PollEvent::Data(_))).collect();
        assert_eq!(kinds, vec![true, false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_sentinel_ends_activation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![Step::Ok, Step::Ok, Step::Stop, Step::Ok];
        let poller = Poller::new("test", scripted(script, Arc::clone(&calls))).with_config(config(5));
        let (_activation, mut rx) = poller.spawn();

        let events = drain(&mut rx).await;

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, PollEvent::Data(r) if r.data == Some(7))));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_ticks_emit_once_each_until_cancelled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new("test", scripted(vec![Step::Ok], Arc::clone(&calls))).with_config(config(1));
        let (activation, mut rx) = poller.spawn();

        for _ in 0..5 {
            assert!(matches!(rx.recv().await, Some(PollEvent::Data(_))));
        }

        drop(activation);
        let buffered = drain(&mut rx).await;
        let emitted = 5 + buffered.len();
        let calls_at_cancel = calls.load(Ordering::SeqCst);
        assert!(calls_at_cancel == emitted || calls_at_cancel == emitted + 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), calls_at_cancel);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_activation_never_emits_in_flight_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let poller = Poller::new("slow", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(Some(response(200)))
            }
        });
        let (activation, mut rx) = poller.spawn();
        let liveness = activation.liveness();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(liveness.is_alive());
        activation.cancel();
        assert!(!liveness.is_alive());

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn retry_budget_saturates_at_zero() {
        let mut budget = RetryBudget::new(1);
        assert!(!budget.is_exhausted());
        assert_eq!(budget.consume(), 0);
        assert!(budget.is_exhausted());
        assert_eq!(budget.consume(), 0);
        assert_eq!(RetryBudget::new(4).consume(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sentinel_on_immediate_call_is_a_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![Step::Stop, Step::Ok];
        let poller = Poller::new("test", scripted(script, Arc::clone(&calls))).with_config(config(3));
        let (activation, mut rx) = poller.spawn();

        assert!(matches!(
            rx.recv().await,
            Some(PollEvent::Failed { origin: TickOrigin::Immediate, error: AppError::Unavailable(_) })
        ));
        for _ in 0..3 {
            assert!(matches!(rx.recv().await, Some(PollEvent::Data(_))));
        }
        assert!(!activation.is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_keeps_ticking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::new("test", scripted(vec![Step::Ok], Arc::clone(&calls))).with_config(PollConfig {
            delay: Duration::ZERO,
            retries: 1,
        });
        let (activation, mut rx) = poller.spawn();

        for _ in 0..4 {
            assert!(matches!(rx.recv().await, Some(PollEvent::Data(_))));
        }
        assert!(!activation.is_finished());
    }
}
