//! Repository traits for metadata operations.

pub mod articles;
pub mod idempotency;

pub use articles::ArticleRepo;
pub use idempotency::IdempotencyRepo;
