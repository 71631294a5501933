use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{GatewayFailure, ProviderRequest, RawOutcome, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial: delay,
            factor: 1.0,
            max: delay,
        }
    }

    pub fn exponential(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial,
            factor,
            max,
        }
    }

    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.initial,
            BackoffKind::Exponential => {
                let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
                let nanos = self.initial.as_nanos() as f64 * self.factor.powi(exp);
                if nanos.is_finite() && nanos < self.max.as_nanos() as f64 {
                    Duration::from_nanos(nanos.round() as u64)
                } else {
                    self.max
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts made after the first one.
    pub max_retries: usize,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::fixed(Duration::ZERO),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::exponential(Duration::from_millis(200), 2.0, Duration::from_secs(2)),
        }
    }
}

/// Re-issues transient failures sequentially. Anything else, including an
/// open circuit, is returned as-is on the first occurrence.
#[derive(Debug)]
pub struct Retry<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retry<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

fn is_retryable(outcome: &RawOutcome) -> bool {
    match outcome {
        Ok(response) => response.is_transient(),
        Err(GatewayFailure::TransientNetworkError) => true,
        Err(
            GatewayFailure::CircuitOpen
            | GatewayFailure::TimeoutElapsed
            | GatewayFailure::Cancelled
            | GatewayFailure::InvalidRequest,
        ) => false,
    }
}

#[async_trait]
impl<T: Transport> Transport for Retry<T> {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        let mut attempts: usize = 0;
        loop {
            let outcome = self.inner.send(request, cancel).await;
            if attempts >= self.policy.max_retries || !is_retryable(&outcome) {
                return outcome;
            }

            let delay = self.policy.backoff.delay_for_attempt(attempts);
            attempts += 1;
            debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying weather provider call"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GatewayFailure::Cancelled),
                () = sleep(delay) => {}
            }
        }
    }
}
