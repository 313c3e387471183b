//! HTTP API server for Keyward.
//!
//! This crate provides the HTTP surface:
//! - Idempotency middleware for opt-in routes
//! - Article create, list and get endpoints
//! - Health, readiness and Prometheus metrics endpoints

pub mod error;
pub mod events;
pub mod handlers;
pub mod idempotency;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use events::{EventPublisher, NewsCreated, TracingEventPublisher};
pub use idempotency::{IdempotentRoute, REPLAYED_HEADER, idempotency_middleware};
pub use routes::create_router;
pub use state::AppState;
