//! Prometheus metrics for the Keyward server.
//!
//! Exposes idempotency admission outcomes, claim latency and article writes.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no idempotency keys or request bodies, only aggregate counts.
//! Restrict the endpoint to scraper IPs at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use keyward_idempotency::{InterceptObserver, InterceptOutcome};
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};
use std::time::Duration;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Idempotency metrics
pub static IDEMPOTENCY_OUTCOMES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keyward_idempotency_outcomes_total",
            "Idempotent requests by admission outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static IDEMPOTENCY_HANDLER_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keyward_idempotency_handler_failures_total",
        "Admitted requests whose handler failed, releasing the key",
    )
    .expect("metric creation failed")
});

pub static IDEMPOTENCY_COMPLETE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keyward_idempotency_complete_failures_total",
        "Successful requests whose response could not be recorded",
    )
    .expect("metric creation failed")
});

pub static IDEMPOTENCY_CLAIM_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "keyward_idempotency_claim_duration_seconds",
            "Time taken to decide admission for an idempotent request",
        )
        .buckets(vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
    )
    .expect("metric creation failed")
});

// Article metrics
pub static ARTICLES_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keyward_articles_created_total",
        "Total number of articles created",
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(IDEMPOTENCY_OUTCOMES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IDEMPOTENCY_HANDLER_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IDEMPOTENCY_COMPLETE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IDEMPOTENCY_CLAIM_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ARTICLES_CREATED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record an admission outcome.
pub fn record_outcome(outcome: InterceptOutcome) {
    IDEMPOTENCY_OUTCOMES
        .with_label_values(&[outcome.as_str()])
        .inc();
}

/// Feeds interceptor events into the global registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusObserver;

impl InterceptObserver for PrometheusObserver {
    fn on_outcome(&self, outcome: InterceptOutcome) {
        record_outcome(outcome);
    }

    fn on_claim_duration(&self, elapsed: Duration) {
        IDEMPOTENCY_CLAIM_DURATION.observe(elapsed.as_secs_f64());
    }

    fn on_handler_failure(&self) {
        IDEMPOTENCY_HANDLER_FAILURES.inc();
    }

    fn on_complete_failure(&self) {
        IDEMPOTENCY_COMPLETE_FAILURES.inc();
    }
}
