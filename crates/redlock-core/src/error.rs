//! Error types for lock operations.

use thiserror::Error;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock could not be acquired within the configured retry budget.
    ///
    /// Only surfaced by the strict scoped form; the plain `lock` call
    /// reports exhaustion as `Ok(None)`.
    #[error("failed to acquire lock on resource: {0}")]
    Unavailable(String),

    /// No lock instances were configured.
    ///
    /// With zero servers the quorum `n/2 + 1 = 1` can never be met, so an
    /// empty instance list is rejected at construction time.
    #[error("no lock instances configured")]
    NoInstances,

    /// Backend connection failed.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Backend-specific error.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
