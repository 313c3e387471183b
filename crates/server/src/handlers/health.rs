//! Liveness and readiness endpoints.
//!
//! Both are unauthenticated so load balancers and orchestrators can poll them.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// GET {prefix}/health - Liveness.
pub async fn health_check() -> Json<HealthResponse> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(HealthResponse {
        status: "ok",
        timestamp,
    })
}

/// Status of one dependency.
#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub status: &'static str,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub metadata: DependencyStatus,
    pub cache: DependencyStatus,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// "ok", "degraded" (cache down) or "unavailable" (metadata store down).
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// GET {prefix}/health/ready - Readiness.
///
/// The metadata store is required. The cache is not: the coordinator falls
/// back to the store, so a cache outage only degrades the service.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let metadata = match state.metadata.health_check().await {
        Ok(()) => DependencyStatus {
            status: "ok",
            backend: state.metadata.backend_name(),
            error: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "Metadata store health check failed");
            DependencyStatus {
                status: "down",
                backend: state.metadata.backend_name(),
                error: Some(e.to_string()),
            }
        }
    };

    let cache = match state.cache.health_check().await {
        Ok(()) => DependencyStatus {
            status: "ok",
            backend: state.cache.backend_name(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Cache health check failed");
            DependencyStatus {
                status: "down",
                backend: state.cache.backend_name(),
                error: Some(e.to_string()),
            }
        }
    };

    let (code, status) = match (metadata.error.is_none(), cache.error.is_none()) {
        (true, true) => (StatusCode::OK, "ok"),
        (true, false) => (StatusCode::OK, "degraded"),
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };

    (
        code,
        Json(ReadinessResponse {
            status,
            checks: ReadinessChecks { metadata, cache },
        }),
    )
}
