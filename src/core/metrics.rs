//! Prometheus metrics for monitoring the gateway.
//!
//! This module provides a centralized metrics registry tracking request
//! counts, latency, and token usage across both public endpoints.

use axum::{extract::Request, middleware::Next, response::Response};
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Instant;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Total token usage by model and token type
    pub token_usage: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls
/// return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "zai_proxy_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "zai_proxy_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let token_usage = register_int_counter_vec!(
            "zai_proxy_tokens_total",
            "Total number of tokens used",
            &["model", "token_type"]
        )
        .expect("Failed to register token_usage metric");

        Metrics {
            request_count,
            request_duration,
            token_usage,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

/// Middleware recording per-request count and duration.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let metrics = get_metrics();
    metrics
        .request_count
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    metrics
        .request_duration
        .with_label_values(&[&method, &endpoint])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Record token usage for one completed request.
pub fn record_token_usage(model: &str, prompt_tokens: usize, completion_tokens: usize) {
    let metrics = get_metrics();

    metrics
        .token_usage
        .with_label_values(&[model, "prompt"])
        .inc_by(prompt_tokens as u64);
    metrics
        .token_usage
        .with_label_values(&[model, "completion"])
        .inc_by(completion_tokens as u64);
    metrics
        .token_usage
        .with_label_values(&[model, "total"])
        .inc_by((prompt_tokens + completion_tokens) as u64);

    tracing::debug!(
        "Token usage - model={} prompt={} completion={}",
        model,
        prompt_tokens,
        completion_tokens
    );
}
