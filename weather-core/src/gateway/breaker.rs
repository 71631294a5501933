//! Circuit breaker over a rolling sampling window.
//!
//! State transitions are driven only by recorded outcomes and [`Clock::now`],
//! so a fixed sequence of outcomes and clock readings always yields the same
//! transitions. All state sits behind one mutex; concurrent callers observe a
//! serialized sequence of transitions.

use std::{
    collections::{HashMap, VecDeque},
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{GatewayFailure, ProviderRequest, RawOutcome, Transport};

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Tokio's clock; follows paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// The breaker opens once the failure ratio in the window exceeds this.
    pub failure_ratio: f64,
    /// Samples required in the window before the ratio is evaluated.
    pub minimum_throughput: usize,
    pub sampling_window: Duration,
    pub break_duration: Duration,
}

impl BreakerConfig {
    pub fn with_break_duration(break_duration: Duration) -> Self {
        Self {
            break_duration,
            ..Self::default()
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            minimum_throughput: 5,
            sampling_window: Duration::from_secs(30),
            break_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// (recorded at, succeeded)
    samples: VecDeque<(Instant, bool)>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                samples: VecDeque::new(),
            }),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask to make one attempt. Fails fast while the circuit is open or while
    /// a half-open trial is already running.
    pub fn try_acquire(&self) -> Result<Permit<'_>, GatewayFailure> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let current = inner.state;
        let trial = match current {
            CircuitState::Closed => false,
            CircuitState::Open { until } if now < until => {
                return Err(GatewayFailure::CircuitOpen);
            }
            CircuitState::Open { .. } | CircuitState::HalfOpen { trial_in_flight: false } => {
                info!("circuit half-open, allowing trial call");
                inner.state = CircuitState::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            CircuitState::HalfOpen {
                trial_in_flight: true,
            } => return Err(GatewayFailure::CircuitOpen),
        };

        Ok(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record(&self, trial: bool, success: bool) {
        let now = self.clock.now();
        let mut inner = self.lock();

        if trial {
            inner.samples.clear();
            if success {
                info!("circuit closed after successful trial call");
                inner.state = CircuitState::Closed;
            } else {
                warn!(
                    break_ms = self.config.break_duration.as_millis() as u64,
                    "circuit re-opened after failed trial call"
                );
                inner.state = CircuitState::Open {
                    until: now + self.config.break_duration,
                };
            }
            return;
        }

        // Samples from attempts admitted before a transition no longer count.
        if inner.state != CircuitState::Closed {
            return;
        }

        inner.samples.push_back((now, success));
        let window = self.config.sampling_window;
        while inner
            .samples
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > window)
        {
            inner.samples.pop_front();
        }

        let total = inner.samples.len();
        if total < self.config.minimum_throughput {
            return;
        }

        let failures = inner.samples.iter().filter(|(_, ok)| !ok).count();
        let ratio = failures as f64 / total as f64;
        if ratio > self.config.failure_ratio {
            warn!(
                failures,
                total,
                break_ms = self.config.break_duration.as_millis() as u64,
                "circuit opened"
            );
            inner.samples.clear();
            inner.state = CircuitState::Open {
                until: now + self.config.break_duration,
            };
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state
            == (CircuitState::HalfOpen {
                trial_in_flight: true,
            })
        {
            inner.state = CircuitState::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission for one attempt. Dropping an unsettled trial permit (the
/// attempt was cancelled or timed out) frees the half-open slot for the next
/// caller.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn succeeded(mut self) {
        self.settled = true;
        self.breaker.record(self.trial, true);
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.breaker.record(self.trial, false);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}

/// Process-wide breakers, one per upstream target.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// The shared breaker for `target`, created on first use.
    pub fn breaker_for(&self, target: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(target.to_owned())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_clock(self.config, self.clock.clone()))
            })
            .clone()
    }
}

/// Decorator that gates every attempt on a shared [`CircuitBreaker`].
#[derive(Debug)]
pub struct Breaker<T> {
    inner: T,
    breaker: Arc<CircuitBreaker>,
}

impl<T> Breaker<T> {
    pub fn new(inner: T, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl<T: Transport> Transport for Breaker<T> {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        let permit = self.breaker.try_acquire()?;
        let outcome = self.inner.send(request, cancel).await;

        match &outcome {
            Ok(response) if response.is_transient() => permit.failed(),
            Ok(_) => permit.succeeded(),
            Err(GatewayFailure::TransientNetworkError | GatewayFailure::TimeoutElapsed) => {
                permit.failed()
            }
            // Nothing reached upstream, or the caller walked away.
            Err(
                GatewayFailure::Cancelled
                | GatewayFailure::CircuitOpen
                | GatewayFailure::InvalidRequest,
            ) => drop(permit),
        }

        outcome
    }
}
