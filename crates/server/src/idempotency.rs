//! Idempotency middleware for opt-in routes.
//!
//! Attach with `route_layer(from_fn_with_state(IdempotentRoute::new(..), idempotency_middleware))`.
//! Requests without the key header pass straight through. With a key, the
//! route handler runs at most once per (key, `METHOD:path`); duplicates get
//! the recorded response or a 409 while the first attempt is still running.

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, Request, State};
use axum::http::response::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use keyward_core::{IdempotencyKey, IdempotencyScope, ResourceAction, StoredResponse};
use keyward_idempotency::{
    InterceptError, InterceptOutcome, Intercepted, Interceptor, Replayable,
};
use serde_json::Value;

const DEFAULT_HEADER_NAME: &str = "idempotency-key";

/// Header set on responses served from a recorded completion.
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// Per-route middleware state.
#[derive(Clone)]
pub struct IdempotentRoute {
    interceptor: Interceptor,
    header_name: HeaderName,
    ttl_secs: Option<u64>,
    max_body_bytes: usize,
}

impl IdempotentRoute {
    /// Build route state from the shared application state.
    ///
    /// `ttl_secs` overrides the configured default TTL for this route.
    pub fn new(state: &AppState, ttl_secs: Option<u64>) -> Self {
        let config = &state.config.idempotency;
        let header_name = HeaderName::try_from(config.header_name.as_str()).unwrap_or_else(|e| {
            tracing::warn!(
                header_name = %config.header_name,
                error = %e,
                fallback = DEFAULT_HEADER_NAME,
                "Invalid idempotency header name"
            );
            HeaderName::from_static(DEFAULT_HEADER_NAME)
        });
        Self {
            interceptor: state.interceptor.clone(),
            header_name,
            ttl_secs,
            max_body_bytes: config.max_replay_body_bytes,
        }
    }

    /// Scope for this request, or `None` when no key was sent.
    fn scope_for(&self, req: &Request) -> Result<Option<IdempotencyScope>, ApiError> {
        let Some(value) = req.headers().get(&self.header_name) else {
            return Ok(None);
        };
        let raw = value.to_str().map_err(|_| {
            ApiError::BadRequest(format!("{} header must be visible ASCII", self.header_name))
        })?;
        if raw.is_empty() {
            return Ok(None);
        }

        let key = IdempotencyKey::parse(raw)?;
        let path = req
            .extensions()
            .get::<OriginalUri>()
            .map(|uri| uri.path().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let action = ResourceAction::new(req.method().as_str(), &path)?;
        Ok(Some(IdempotencyScope::new(key, action)))
    }
}

/// A 2xx response buffered so it can be recorded and still sent.
struct CapturedResponse {
    parts: Parts,
    body: Bytes,
    snapshot: StoredResponse,
}

impl Replayable for CapturedResponse {
    fn snapshot(&self) -> StoredResponse {
        self.snapshot.clone()
    }
}

impl IntoResponse for CapturedResponse {
    fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body))
    }
}

/// Middleware enforcing idempotency on the wrapped route.
pub async fn idempotency_middleware(
    State(route): State<IdempotentRoute>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(scope) = route.scope_for(&req)? else {
        metrics::record_outcome(InterceptOutcome::Passthrough);
        return Ok(next.run(req).await);
    };

    let max_body_bytes = route.max_body_bytes;
    let result = route
        .interceptor
        .intercept(Some(&scope), route.ttl_secs, move || async move {
            let response = next.run(req).await;
            capture(response, max_body_bytes).await
        })
        .await;

    match result {
        Ok(Intercepted::Executed(captured)) => Ok(captured.into_response()),
        Ok(Intercepted::Replayed(stored)) => Ok(replay(stored)),
        Err(InterceptError::Conflict) => {
            tracing::debug!(
                idempotency_key = %scope.key,
                resource_action = %scope.resource_action,
                "Rejecting duplicate while first attempt is in progress"
            );
            Err(ApiError::Conflict(
                "a request with this idempotency key is already being processed".to_string(),
            ))
        }
        Err(InterceptError::Coordinator(e)) => Err(e.into()),
        // Non-2xx responses are returned as the handler produced them.
        Err(InterceptError::Handler(response)) => Ok(response),
    }
}

/// Buffer a successful response. Non-2xx responses count as handler failures.
async fn capture(response: Response, limit: usize) -> Result<CapturedResponse, Response> {
    if !response.status().is_success() {
        return Err(response);
    }

    let (parts, body) = response.into_parts();
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Err(ApiError::Internal(format!(
                "response body could not be buffered for replay (limit {limit} bytes): {e}"
            ))
            .into_response());
        }
    };

    let snapshot = StoredResponse::new(parts.status.as_u16(), body_to_json(&body));
    Ok(CapturedResponse {
        parts,
        body,
        snapshot,
    })
}

/// JSON bodies are kept as-is, other text as a JSON string, empty as `None`.
///
/// Only the status and this value are recorded. A replay is always sent as
/// `application/json` without the original headers, so a non-JSON body comes
/// back as a JSON string rather than byte for byte. Routes that opt in must
/// answer with JSON.
fn body_to_json(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

/// Rebuild a recorded response: status, JSON body and the replay marker.
fn replay(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status_code).unwrap_or(StatusCode::OK);
    let mut response = match stored.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };
    response.headers_mut().insert(
        HeaderName::from_static(REPLAYED_HEADER),
        HeaderValue::from_static("true"),
    );
    response
}
