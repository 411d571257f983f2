//! Core traits for quorum lock instances.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

/// One backing server's atomic lock primitives.
///
/// The quorum coordinator owns a set of instances and fans every operation
/// out to all of them; each instance is responsible for making its three
/// primitives atomic against concurrent contenders on that server.
///
/// # Example
///
/// ```rust,ignore
/// let granted = instance
///     .try_acquire("orders", token, Duration::from_secs(1), true)
///     .await?;
/// ```
pub trait LockInstance: Send + Sync {
    /// Attempts to set `resource` to `token` with a `ttl` expiry.
    ///
    /// The grant succeeds iff the key is absent and `allow_new` is true
    /// (fresh acquisition), or the key already holds this exact token (the
    /// extend case).
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - This server granted the lock
    /// * `Ok(false)` - Denied, or the server was unreachable (a connection
    ///   failure is indistinguishable from a denial to the quorum count)
    /// * `Err(...)` - The server answered with a non-connection error
    fn try_acquire(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
        allow_new: bool,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Deletes `resource` iff it still holds `token`.
    ///
    /// Best-effort: all errors are swallowed. A server that missed the
    /// release drops the key on TTL, and the token check means a late
    /// release can never disturb a newer holder.
    fn release(&self, resource: &str, token: &str) -> impl Future<Output = ()> + Send;

    /// Reads the held token and its remaining TTL in one atomic step.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((value, pttl_ms)))` - The key exists with this token
    /// * `Ok(None)` - Key absent, or the server was unreachable
    /// * `Err(...)` - The server answered with a non-connection error
    fn read_ttl(&self, resource: &str)
    -> impl Future<Output = LockResult<Option<(String, i64)>>> + Send;
}
