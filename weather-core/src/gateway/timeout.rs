use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{GatewayFailure, ProviderRequest, RawOutcome, Transport};

/// Wall-clock budget for one logical call, covering every attempt and
/// backoff beneath it.
///
/// When the budget runs out the inner call is dropped and its child token
/// cancelled, which is reported as [`GatewayFailure::TimeoutElapsed`]. The
/// caller's own token firing is reported as [`GatewayFailure::Cancelled`].
#[derive(Debug)]
pub struct TotalTimeout<T> {
    inner: T,
    budget: Duration,
}

impl<T> TotalTimeout<T> {
    pub fn new(inner: T, budget: Duration) -> Self {
        Self { inner, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

#[async_trait]
impl<T: Transport> Transport for TotalTimeout<T> {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        let attempt_cancel = cancel.child_token();
        let bounded = timeout(self.budget, self.inner.send(request, &attempt_cancel));

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GatewayFailure::Cancelled),
            result = bounded => match result {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    attempt_cancel.cancel();
                    warn!(
                        budget_ms = self.budget.as_millis() as u64,
                        "weather provider call exceeded total timeout"
                    );
                    Err(GatewayFailure::TimeoutElapsed)
                }
            },
        }
    }
}
