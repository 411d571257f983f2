//! Convenience prelude for quorum lock types.

pub use crate::error::{LockError, LockResult};
pub use crate::lock::Lock;
pub use crate::options::AcquireOptions;
pub use crate::retry::RetryDelay;
pub use crate::time::TimeSource;
pub use crate::traits::LockInstance;
