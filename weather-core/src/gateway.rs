//! Resilient gateway around one outbound network call.
//!
//! Each policy is a decorator implementing [`Transport`] over an inner
//! [`Transport`], so any of them can be exercised alone against a fake. The
//! composed stack, outermost first, is total timeout → retry → circuit breaker
//! → transport: the budget bounds every retry, and every attempt passes the
//! breaker.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

pub mod breaker;
pub mod retry;
pub mod timeout;

pub use breaker::{
    Breaker, BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, Clock, Permit,
    SystemClock,
};
pub use retry::{Backoff, Retry, RetryPolicy};
pub use timeout::TotalTimeout;

/// One outbound GET: a path relative to the provider base URL plus query pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

/// Response as received from the provider, before any classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    /// `Retry-After` header, when given as delta seconds.
    pub retry_after_seconds: Option<u32>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Statuses worth another attempt; the breaker counts the same set as failures.
    pub fn is_transient(&self) -> bool {
        is_transient_status(self.status)
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Why the gateway produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GatewayFailure {
    #[error("transient-network-error")]
    TransientNetworkError,
    #[error("circuit-open")]
    CircuitOpen,
    #[error("timeout-elapsed")]
    TimeoutElapsed,
    /// The caller's own cancellation token fired.
    #[error("cancelled")]
    Cancelled,
    /// The request could not be turned into a network call at all. Repeating
    /// it cannot help, and it says nothing about upstream health.
    #[error("invalid-request")]
    InvalidRequest,
}

pub type RawOutcome = Result<RawResponse, GatewayFailure>;

/// The "perform one network call" capability.
///
/// Implementations must stop promptly once `cancel` fires and report
/// [`GatewayFailure::Cancelled`].
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        (**self).send(request, cancel).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        (**self).send(request, cancel).await
    }
}

/// Knobs for the composed policy stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResilienceSettings {
    pub retry: RetryPolicy,
    pub total_timeout: Duration,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            total_timeout: Duration::from_secs(5),
        }
    }
}

/// Total timeout → retry → circuit breaker → `T`.
#[derive(Debug)]
pub struct ResilientGateway<T> {
    stack: TotalTimeout<Retry<Breaker<T>>>,
}

impl<T: Transport> ResilientGateway<T> {
    pub fn new(transport: T, settings: ResilienceSettings, breaker: Arc<CircuitBreaker>) -> Self {
        let guarded = Breaker::new(transport, breaker);
        let retried = Retry::new(guarded, settings.retry);
        Self {
            stack: TotalTimeout::new(retried, settings.total_timeout),
        }
    }

    /// Run one logical call through every policy.
    pub async fn execute(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        self.stack.send(request, cancel).await
    }
}

#[async_trait]
impl<T: Transport> Transport for ResilientGateway<T> {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        self.execute(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, forecast_request, response};

    fn settings(max_retries: usize) -> ResilienceSettings {
        ResilienceSettings {
            retry: RetryPolicy {
                max_retries,
                backoff: Backoff::fixed(Duration::from_millis(10)),
            },
            total_timeout: Duration::from_secs(5),
        }
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_ratio: 0.5,
            minimum_throughput: 4,
            sampling_window: Duration::from_secs(30),
            break_duration: Duration::from_secs(30),
        }))
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::OK));
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_retry_is_invisible_to_caller() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Err(GatewayFailure::TransientNetworkError),
            Ok(response(200, b"{}")),
        ]));
        let gateway = ResilientGateway::new(transport.clone(), settings(3), breaker());

        let outcome = gateway
            .execute(&forecast_request(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.unwrap().status, StatusCode::OK);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_fails_fast_without_network_or_retries() {
        let transport = Arc::new(ScriptedTransport::always(Ok(response(503, b""))));
        let breaker = breaker();
        let gateway = ResilientGateway::new(transport.clone(), settings(3), breaker.clone());
        let cancel = CancellationToken::new();

        // 1 attempt + 3 retries = 4 failures, enough to trip the breaker.
        let first = gateway.execute(&forecast_request(), &cancel).await;
        assert_eq!(first.unwrap().status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transport.calls(), 4);
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));

        let second = gateway.execute(&forecast_request(), &cancel).await;
        assert_eq!(second.unwrap_err(), GatewayFailure::CircuitOpen);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_bounds_the_whole_retry_sequence() {
        let transport = Arc::new(
            ScriptedTransport::always(Err(GatewayFailure::TransientNetworkError))
                .with_latency(Duration::from_secs(2)),
        );
        let gateway = ResilientGateway::new(transport.clone(), settings(20), breaker());

        let outcome = gateway
            .execute(&forecast_request(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.unwrap_err(), GatewayFailure::TimeoutElapsed);
        assert!(transport.calls() <= 3);
    }
}
