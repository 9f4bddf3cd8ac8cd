//! Correlation ids carried across publish and consume.
//!
//! The ambient id comes from the task-local scope set by the consume loop,
//! falling back to the active OpenTelemetry span context.

use std::future::Future;

use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use uuid::Uuid;

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Runs `fut` with `id` as the ambient correlation id.
pub async fn scope<F: Future>(id: String, fut: F) -> F::Output {
    CORRELATION_ID.scope(id, fut).await
}

pub fn current() -> Option<String> {
    if let Ok(id) = CORRELATION_ID.try_with(|id| id.clone()) {
        return Some(id);
    }

    let context = Context::current();
    let span = context.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

/// The ambient id, or a fresh random one.
pub fn current_or_random() -> String {
    current().unwrap_or_else(random)
}

/// 32 lowercase hex chars.
pub fn random() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 32 hex chars, not all zeros.
pub fn is_valid(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit()) && id.bytes().any(|b| b != b'0')
}
