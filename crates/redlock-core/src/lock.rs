//! The lock descriptor returned to a successful caller.

use std::time::Duration;

/// Proof of a successful quorum acquisition.
///
/// The descriptor is plain immutable data. `value` is the per-acquisition
/// random token; every server-side state transition (release, conditional
/// extend, TTL readback) gates on byte-equality of this token.
///
/// `validity` is an upper bound on how long from the moment of return the
/// holder may assume exclusivity. A descriptor with zero validity must be
/// treated as already expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// The resource name, used as the key on every backing server.
    pub resource: String,
    /// The acquisition token.
    pub value: String,
    /// Remaining safe lifetime at the moment the descriptor was returned.
    pub validity: Duration,
}

impl Lock {
    /// Creates a descriptor.
    pub fn new(resource: impl Into<String>, value: impl Into<String>, validity: Duration) -> Self {
        Self {
            resource: resource.into(),
            value: value.into(),
            validity,
        }
    }
}
