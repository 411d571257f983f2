//! Retry delay policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Delay between acquisition attempts.
///
/// Either a fixed duration or a callable of the attempt index, which lets
/// callers plug in exponential backoff without changing the coordinator.
/// The callable must be safe to invoke concurrently.
#[derive(Clone)]
pub enum RetryDelay {
    /// The same delay before every retry.
    Fixed(Duration),
    /// Delay computed from the zero-based attempt index.
    FromFn(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl RetryDelay {
    /// Builds a delay policy from a callable of the attempt index.
    pub fn from_fn(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self::FromFn(Arc::new(f))
    }

    /// Evaluates the delay for the given attempt index.
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::FromFn(f) => f(attempt),
        }
    }
}

impl From<Duration> for RetryDelay {
    fn from(delay: Duration) -> Self {
        Self::Fixed(delay)
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::FromFn(_) => f.debug_tuple("FromFn").finish(),
        }
    }
}
