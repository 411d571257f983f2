//! Acquisition options.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::lock::Lock;

/// Suppresses the runtime deprecation warnings emitted for legacy option
/// aliases. Intended for test suites that exercise the aliases on purpose.
pub fn suppress_deprecation_warnings(suppress: bool) {
    SUPPRESS_DEPRECATIONS.store(suppress, Ordering::Relaxed);
}

static SUPPRESS_DEPRECATIONS: AtomicBool = AtomicBool::new(false);

fn warn_once(flag: &AtomicBool, message: &str) {
    if flag.swap(true, Ordering::Relaxed) {
        return;
    }
    if !SUPPRESS_DEPRECATIONS.load(Ordering::Relaxed) {
        tracing::warn!("{message}");
    }
}

/// Options for a single acquisition.
///
/// The default options describe a fresh acquisition: a new token is minted
/// and the key may be created on servers where it is absent.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    extend: Option<Lock>,
    extend_only_if_locked: bool,
}

impl AcquireOptions {
    /// Reuses the token of an existing descriptor instead of minting a new
    /// one. Extends run as a single attempt without retries.
    pub fn extend(mut self, lock: &Lock) -> Self {
        self.extend = Some(lock.clone());
        self
    }

    /// When extending, forbids re-creating the key if the lock has lapsed
    /// on a server. Off by default: a lapsed lock is re-created under the
    /// same token.
    pub fn extend_only_if_locked(mut self, only_if_locked: bool) -> Self {
        self.extend_only_if_locked = only_if_locked;
        self
    }

    /// Legacy alias of [`extend_only_if_locked`](Self::extend_only_if_locked).
    #[deprecated(note = "use `extend_only_if_locked` instead")]
    pub fn extend_only_if_life(self, only_if_life: bool) -> Self {
        static WARNED: AtomicBool = AtomicBool::new(false);
        warn_once(
            &WARNED,
            "the `extend_only_if_life` option is deprecated, use `extend_only_if_locked`",
        );
        self.extend_only_if_locked(only_if_life)
    }

    /// Legacy alias of [`extend_only_if_locked`](Self::extend_only_if_locked).
    #[deprecated(note = "use `extend_only_if_locked` instead")]
    pub fn extend_life(self, extend_life: bool) -> Self {
        static WARNED: AtomicBool = AtomicBool::new(false);
        warn_once(
            &WARNED,
            "the `extend_life` option is deprecated, use `extend_only_if_locked`",
        );
        self.extend_only_if_locked(extend_life)
    }

    /// The descriptor being extended, if any.
    pub fn extending(&self) -> Option<&Lock> {
        self.extend.as_ref()
    }

    /// Whether the acquisition may create the key where it is absent.
    pub fn allow_new(&self) -> bool {
        !self.extend_only_if_locked
    }
}
