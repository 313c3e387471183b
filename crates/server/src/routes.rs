//! Route configuration.

use crate::handlers;
use crate::idempotency::{IdempotentRoute, idempotency_middleware};
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let create_article_guard = IdempotentRoute::new(
        &state,
        Some(state.config.idempotency.create_article_ttl_secs),
    );

    let api_routes = Router::new()
        // Health checks (unauthenticated for load balancers and k8s)
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        // Articles; creation is idempotent when the client sends a key
        .route(
            "/articles",
            post(handlers::create_article).route_layer(middleware::from_fn_with_state(
                create_article_guard,
                idempotency_middleware,
            )),
        )
        .route("/articles", get(handlers::list_articles))
        .route("/articles/{id}", get(handlers::get_article));

    let prefix = state.config.server.api_prefix.as_str();
    let mut router = if prefix.is_empty() {
        Router::new().merge(api_routes)
    } else {
        Router::new().nest(prefix, api_routes)
    };

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
