//! Idempotent request coordination for keyward.
//!
//! This crate provides:
//! - [`IdempotencyCoordinator`]: `check_and_claim`, `complete` and `fail`
//!   over a volatile cache and a durable record store
//! - [`Interceptor`]: runs a handler at most once per key and replays its
//!   recorded response on duplicates

pub mod coordinator;
pub mod error;
pub mod interceptor;

pub use coordinator::{ClaimOutcome, ClaimToken, IdempotencyCoordinator};
pub use error::{IdempotencyError, IdempotencyResult};
pub use interceptor::{
    InterceptError, InterceptObserver, InterceptOutcome, Intercepted, Interceptor, Replayable,
};
