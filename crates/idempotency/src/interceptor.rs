//! Wraps an operation so it runs at most once per idempotency scope.

use crate::coordinator::{ClaimOutcome, ClaimToken, IdempotencyCoordinator};
use crate::error::IdempotencyError;
use futures::FutureExt;
use keyward_core::{IdempotencyScope, StoredResponse};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A successful handler result that can be recorded for replay.
pub trait Replayable {
    fn snapshot(&self) -> StoredResponse;
}

impl Replayable for StoredResponse {
    fn snapshot(&self) -> StoredResponse {
        self.clone()
    }
}

/// What [`Interceptor::intercept`] did.
#[derive(Debug, PartialEq)]
pub enum Intercepted<T> {
    /// The handler ran (first attempt, or no idempotency key).
    Executed(T),
    /// A previous attempt completed; this is its recorded response.
    Replayed(StoredResponse),
}

#[derive(Debug, Error)]
pub enum InterceptError<E> {
    /// Another attempt with the same key is still running.
    #[error("a request with this idempotency key is already being processed")]
    Conflict,

    #[error(transparent)]
    Coordinator(#[from] IdempotencyError),

    /// The handler's own error, returned unchanged after the claim was released.
    #[error("{0}")]
    Handler(E),
}

/// Admission outcome as seen by an [`InterceptObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// No scope supplied; the handler ran without coordination.
    Passthrough,
    New,
    InProgress,
    Completed,
}

impl InterceptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl From<&ClaimOutcome> for InterceptOutcome {
    fn from(outcome: &ClaimOutcome) -> Self {
        match outcome {
            ClaimOutcome::New(_) => Self::New,
            ClaimOutcome::InProgress => Self::InProgress,
            ClaimOutcome::Completed(_) => Self::Completed,
        }
    }
}

/// Hooks for metrics. All methods default to no-ops.
pub trait InterceptObserver: Send + Sync {
    fn on_outcome(&self, _outcome: InterceptOutcome) {}

    fn on_claim_duration(&self, _elapsed: Duration) {}

    /// The admitted handler returned an error or panicked.
    fn on_handler_failure(&self) {}

    /// The handler succeeded but its response could not be recorded.
    fn on_complete_failure(&self) {}
}

struct NoopObserver;

impl InterceptObserver for NoopObserver {}

/// Runs handlers under the idempotency protocol.
#[derive(Clone)]
pub struct Interceptor {
    coordinator: Arc<IdempotencyCoordinator>,
    observer: Arc<dyn InterceptObserver>,
}

impl Interceptor {
    pub fn new(coordinator: Arc<IdempotencyCoordinator>) -> Self {
        Self {
            coordinator,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn InterceptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn coordinator(&self) -> &Arc<IdempotencyCoordinator> {
        &self.coordinator
    }

    /// Run `handler` at most once for `scope`.
    ///
    /// - No scope: the handler runs with no coordination.
    /// - First claim: the handler runs once. Success is recorded for replay;
    ///   an error or panic releases the claim so the key can be retried.
    /// - Claim held elsewhere: [`InterceptError::Conflict`], handler not run.
    /// - Already completed: the recorded response, handler not run.
    ///
    /// If recording a successful result fails, the result is still returned
    /// (its side effects have happened) and the failure is logged. The record
    /// then stays IN_PROGRESS.
    pub async fn intercept<T, E, F, Fut>(
        &self,
        scope: Option<&IdempotencyScope>,
        ttl_secs: Option<u64>,
        handler: F,
    ) -> Result<Intercepted<T>, InterceptError<E>>
    where
        T: Replayable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(scope) = scope else {
            self.observer.on_outcome(InterceptOutcome::Passthrough);
            return handler()
                .await
                .map(Intercepted::Executed)
                .map_err(InterceptError::Handler);
        };

        let started = Instant::now();
        let outcome = self.coordinator.check_and_claim(scope, ttl_secs).await;
        self.observer.on_claim_duration(started.elapsed());
        let outcome = outcome?;
        self.observer.on_outcome(InterceptOutcome::from(&outcome));

        match outcome {
            ClaimOutcome::Completed(response) => {
                tracing::debug!(scope = %scope, "Replaying recorded response");
                Ok(Intercepted::Replayed(response))
            }
            ClaimOutcome::InProgress => Err(InterceptError::Conflict),
            ClaimOutcome::New(token) => self.run_admitted(scope, token, ttl_secs, handler).await,
        }
    }

    async fn run_admitted<T, E, F, Fut>(
        &self,
        scope: &IdempotencyScope,
        token: ClaimToken,
        ttl_secs: Option<u64>,
        handler: F,
    ) -> Result<Intercepted<T>, InterceptError<E>>
    where
        T: Replayable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = match AssertUnwindSafe(handler()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                self.observer.on_handler_failure();
                tracing::warn!(scope = %scope, "Handler panicked; releasing idempotency claim");
                if let Err(e) = self.coordinator.fail(scope, token).await {
                    tracing::error!(scope = %scope, error = %e, "Failed to release idempotency claim");
                }
                std::panic::resume_unwind(panic);
            }
        };

        match result {
            Ok(value) => {
                let snapshot = value.snapshot();
                if let Err(e) = self.coordinator.complete(scope, token, &snapshot, ttl_secs).await {
                    self.observer.on_complete_failure();
                    tracing::error!(
                        scope = %scope,
                        error = %e,
                        "Handler succeeded but its response could not be recorded"
                    );
                }
                Ok(Intercepted::Executed(value))
            }
            Err(e) => {
                self.observer.on_handler_failure();
                tracing::debug!(scope = %scope, "Handler failed; releasing idempotency claim");
                if let Err(fail_err) = self.coordinator.fail(scope, token).await {
                    tracing::error!(
                        scope = %scope,
                        error = %fail_err,
                        "Failed to release idempotency claim"
                    );
                }
                Err(InterceptError::Handler(e))
            }
        }
    }
}
