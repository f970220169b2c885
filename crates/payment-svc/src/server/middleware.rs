//! Axum middleware layers applied to the router.
//!
//! Request tracing and the default request deadline.

use std::time::Duration;

use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Request deadline used when `REQUEST_TIMEOUT_SECS` is unset.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request spans at `INFO`. Spans carry method, path and status only; bodies
/// and headers are never recorded.
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
