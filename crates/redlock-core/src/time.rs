//! Monotonic time source.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// A monotonic millisecond counter.
///
/// The validity computation subtracts two samples of this counter; a source
/// that can go backwards would make the elapsed figure negative or wildly
/// inflated, so wall-clock time is not acceptable here. The default source
/// is anchored to a process-local [`Instant`].
///
/// Tests inject a custom source with [`TimeSource::from_fn`].
#[derive(Clone)]
pub struct TimeSource(Arc<dyn Fn() -> u64 + Send + Sync>);

impl TimeSource {
    /// A source backed by the platform monotonic clock.
    pub fn monotonic() -> Self {
        let anchor = Instant::now();
        Self(Arc::new(move || anchor.elapsed().as_millis() as u64))
    }

    /// A source backed by an arbitrary callable. The callable must be safe
    /// to invoke concurrently and must never go backwards.
    pub fn from_fn(f: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Samples the counter.
    pub fn now_millis(&self) -> u64 {
        (self.0)()
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::monotonic()
    }
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimeSource").finish()
    }
}
