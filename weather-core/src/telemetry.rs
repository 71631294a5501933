//! Timed operation scopes for structured logs.

use std::{future::Future, time::Instant};

use tracing::{Instrument, Span, info};

/// Run `fut` inside `span` and log its wall-clock duration when it finishes.
///
/// ```rust,ignore
/// let span = tracing::info_span!("mcp_tool", tool = "get_today_weather");
/// let envelope = timed("mcp_tool", span, tools.get_today_weather(params, &cancel)).await;
/// ```
pub async fn timed<F>(operation: &'static str, span: Span, fut: F) -> F::Output
where
    F: Future,
{
    let started = Instant::now();
    let output = fut.instrument(span.clone()).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    span.in_scope(|| info!(operation, duration_ms, "operation completed"));
    output
}
