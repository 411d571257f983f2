//! Quorum lock coordinator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fred::clients::RedisPool;
use fred::prelude::*;
use rand::Rng;
use redlock_core::error::{LockError, LockResult};
use redlock_core::lock::Lock;
use redlock_core::options::AcquireOptions;
use redlock_core::retry::RetryDelay;
use redlock_core::time::TimeSource;
use redlock_core::traits::LockInstance;
use tracing::{instrument, Span};

use crate::instance::RedisLockInstance;
use crate::quorum;

/// Additional attempts after the first.
pub const DEFAULT_RETRY_COUNT: u32 = 3;
/// Base delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);
/// Upper bound (exclusive) of the uniform random offset added to each delay.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(50);
/// Per-instance network timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(100);

/// Coordinates a set of independent lock instances into one mutual
/// exclusion service.
///
/// A lock is granted only when a strict majority of instances granted it
/// within a window short enough that the requested TTL, less the fan-out
/// latency and a clock drift allowance, is still positive. The instances
/// know nothing of each other; all coordination lives here.
///
/// # Example
///
/// ```rust,no_run
/// # use redlock_redis::LockManager;
/// # use std::time::Duration;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = LockManager::builder()
///     .server("redis://127.0.0.1:6389")
///     .server("redis://127.0.0.1:6399")
///     .server("redis://127.0.0.1:6379")
///     .build()
///     .await?;
///
/// if let Some(lock) = manager.lock("orders", Duration::from_secs(1)).await? {
///     // Critical section, safe for `lock.validity`.
///     manager.unlock(&lock).await;
/// }
/// # Ok(())
/// # }
/// ```
pub struct LockManager<I = RedisLockInstance> {
    instances: Arc<Vec<I>>,
    quorum: usize,
    retry_count: u32,
    retry_delay: RetryDelay,
    retry_jitter: Duration,
    time_source: TimeSource,
}

impl<I> Clone for LockManager<I> {
    fn clone(&self) -> Self {
        Self {
            instances: self.instances.clone(),
            quorum: self.quorum,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay.clone(),
            retry_jitter: self.retry_jitter,
            time_source: self.time_source.clone(),
        }
    }
}

impl LockManager<RedisLockInstance> {
    /// Returns a new builder for configuring the manager.
    pub fn builder() -> LockManagerBuilder {
        LockManagerBuilder::new()
    }

    /// Creates a manager over a single server URL with default settings.
    pub async fn connect(url: impl Into<String>) -> LockResult<Self> {
        Self::builder().server(url).build().await
    }
}

impl<I: LockInstance + 'static> LockManager<I> {
    /// Creates a manager over pre-built instances with default settings.
    ///
    /// An empty instance list is rejected: with zero servers the quorum of
    /// one can never be met.
    pub fn with_instances(instances: Vec<I>) -> LockResult<Self> {
        if instances.is_empty() {
            return Err(LockError::NoInstances);
        }
        let quorum = quorum::quorum(instances.len());
        Ok(Self {
            instances: Arc::new(instances),
            quorum,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: RetryDelay::Fixed(DEFAULT_RETRY_DELAY),
            retry_jitter: DEFAULT_RETRY_JITTER,
            time_source: TimeSource::monotonic(),
        })
    }

    /// Sets the number of additional attempts after the first.
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the delay between attempts.
    pub fn retry_delay(mut self, delay: impl Into<RetryDelay>) -> Self {
        self.retry_delay = delay.into();
        self
    }

    /// Sets the upper bound of the random offset added to each delay.
    pub fn retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Replaces the monotonic time source.
    pub fn time_source(mut self, source: TimeSource) -> Self {
        self.time_source = source;
        self
    }

    /// Acquires a lock on `resource` for `ttl` with default options.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(lock))` - Quorum granted; exclusivity holds for
    ///   `lock.validity`
    /// * `Ok(None)` - Quorum not achieved within the retry budget
    /// * `Err(...)` - A server answered with a non-connection error
    pub async fn lock(&self, resource: &str, ttl: Duration) -> LockResult<Option<Lock>> {
        self.lock_with_options(resource, ttl, AcquireOptions::default())
            .await
    }

    /// Acquires or extends a lock on `resource` for `ttl`.
    ///
    /// With `extend`, the existing descriptor's token is reused and the
    /// acquisition runs as a single attempt; on success the returned
    /// descriptor carries the same token with a fresh validity.
    #[instrument(
        skip(self, options),
        fields(
            lock.resource = %resource,
            servers = self.instances.len(),
            acquired = tracing::field::Empty,
            validity_ms = tracing::field::Empty,
        )
    )]
    pub async fn lock_with_options(
        &self,
        resource: &str,
        ttl: Duration,
        options: AcquireOptions,
    ) -> LockResult<Option<Lock>> {
        let allow_new = options.allow_new();
        let (token, tries) = match options.extending() {
            Some(existing) => (existing.value.clone(), 1),
            None => (mint_token(), self.retry_count + 1),
        };

        for attempt in 0..tries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_pause(attempt)).await;
            }
            if let Some(lock) = self.attempt(resource, &token, ttl, allow_new).await? {
                Span::current().record("acquired", true);
                Span::current().record("validity_ms", lock.validity.as_millis() as u64);
                return Ok(Some(lock));
            }
        }

        Span::current().record("acquired", false);
        Ok(None)
    }

    /// Extends a held lock for another `ttl`, re-creating the key under the
    /// same token on servers where it has lapsed.
    pub async fn extend(&self, lock: &Lock, ttl: Duration) -> LockResult<Option<Lock>> {
        self.lock_with_options(&lock.resource, ttl, AcquireOptions::default().extend(lock))
            .await
    }

    /// Extends a held lock for another `ttl`, failing instead of
    /// re-creating the key where the lock has lapsed.
    pub async fn extend_if_still_locked(
        &self,
        lock: &Lock,
        ttl: Duration,
    ) -> LockResult<Option<Lock>> {
        self.lock_with_options(
            &lock.resource,
            ttl,
            AcquireOptions::default()
                .extend(lock)
                .extend_only_if_locked(true),
        )
        .await
    }

    /// Releases a held lock on every instance.
    ///
    /// Unconditional and best-effort: instances that are unreachable drop
    /// the key on TTL, and the token check on the server side means a
    /// release can never disturb a newer holder. Releasing twice is
    /// indistinguishable from releasing once.
    #[instrument(skip(self, lock), fields(lock.resource = %lock.resource))]
    pub async fn unlock(&self, lock: &Lock) {
        release_on_all(&self.instances, &lock.resource, &lock.value).await;
    }

    /// Remaining TTL of `lock`, provided its token is still the
    /// authoritative one.
    ///
    /// `None` when no quorum of servers agrees on any token, or when the
    /// authoritative token is not this lock's. A zero TTL means the lock
    /// has lapsed; callers treating `None` and zero identically handle
    /// expiry correctly.
    pub async fn remaining_ttl_for_lock(&self, lock: &Lock) -> LockResult<Option<Duration>> {
        Ok(self
            .settle_quorum_ttl(&lock.resource)
            .await?
            .filter(|settled| settled.value == lock.value)
            .map(clamp_ttl))
    }

    /// Remaining TTL of whichever token is authoritative on `resource`.
    pub async fn remaining_ttl_for_resource(&self, resource: &str) -> LockResult<Option<Duration>> {
        Ok(self.settle_quorum_ttl(resource).await?.map(clamp_ttl))
    }

    /// Whether a quorum of servers currently holds any unexpired token on
    /// `resource`.
    pub async fn is_locked(&self, resource: &str) -> LockResult<bool> {
        Ok(self
            .remaining_ttl_for_resource(resource)
            .await?
            .is_some_and(|ttl| !ttl.is_zero()))
    }

    /// Whether `lock` is still the authoritative holder with time left.
    pub async fn is_valid(&self, lock: &Lock) -> LockResult<bool> {
        Ok(self
            .remaining_ttl_for_lock(lock)
            .await?
            .is_some_and(|ttl| !ttl.is_zero()))
    }

    /// Runs `critical_section` under a lock on `resource`.
    ///
    /// The closure receives `Some(lock)` when the acquisition succeeded and
    /// `None` when the retry budget was exhausted; the return value is
    /// whether the lock was held. On success the lock is released on every
    /// exit path, including a panicking or cancelled critical section.
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource: &str,
        ttl: Duration,
        critical_section: F,
    ) -> LockResult<bool>
    where
        F: FnOnce(Option<Lock>) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.lock(resource, ttl).await? {
            Some(lock) => {
                let guard = UnlockGuard::new(self.instances.clone(), lock.clone());
                critical_section(Some(lock)).await;
                guard.release().await;
                Ok(true)
            }
            None => {
                critical_section(None).await;
                Ok(false)
            }
        }
    }

    /// Like [`with_lock`](Self::with_lock), but a failed acquisition is an
    /// error and the critical section's return value is propagated.
    pub async fn with_lock_strict<F, Fut, T>(
        &self,
        resource: &str,
        ttl: Duration,
        critical_section: F,
    ) -> LockResult<T>
    where
        F: FnOnce(Lock) -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(lock) = self.lock(resource, ttl).await? else {
            return Err(LockError::Unavailable(resource.to_string()));
        };
        let guard = UnlockGuard::new(self.instances.clone(), lock.clone());
        let output = critical_section(lock).await;
        guard.release().await;
        Ok(output)
    }

    /// One acquisition attempt: fan out to every instance, aggregate all
    /// replies, then judge quorum and validity from the measured wall
    /// interval. Anything short of a valid quorum rolls back with a
    /// release fan-out, including instances that reported a denial (their
    /// grant may have been committed without us observing it).
    async fn attempt(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
        allow_new: bool,
    ) -> LockResult<Option<Lock>> {
        let started = self.time_source.now_millis();

        // Armed before the fan-out: if this future is dropped mid-attempt,
        // the guard still purges whatever grants were committed.
        let mut rollback = UnlockGuard::new(
            self.instances.clone(),
            Lock::new(resource, token, Duration::ZERO),
        );

        let mut tasks = Vec::with_capacity(self.instances.len());
        for index in 0..self.instances.len() {
            let instances = self.instances.clone();
            let resource = resource.to_string();
            let token = token.to_string();
            tasks.push(tokio::spawn(async move {
                instances[index]
                    .try_acquire(&resource, &token, ttl, allow_new)
                    .await
            }));
        }

        let mut granted = 0;
        let mut first_error = None;
        for task in tasks {
            match task.await {
                Ok(Ok(true)) => granted += 1,
                Ok(Ok(false)) => {}
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                // A panicked fan-out task counts as a non-grant.
                Err(_) => {}
            }
        }

        let elapsed = self.time_source.now_millis().saturating_sub(started);
        let validity = quorum::validity_millis(ttl.as_millis() as u64, elapsed);

        if let Some(error) = first_error {
            rollback.release().await;
            return Err(error);
        }

        if granted >= self.quorum && validity >= 0 {
            rollback.disarm();
            Ok(Some(Lock::new(
                resource,
                token,
                Duration::from_millis(validity as u64),
            )))
        } else {
            tracing::debug!(
                resource,
                granted,
                quorum = self.quorum,
                validity,
                "attempt failed, rolling back partial grants"
            );
            rollback.release().await;
            Ok(None)
        }
    }

    /// Fans `read_ttl` out to every instance and settles the surviving
    /// readings into the authoritative TTL.
    #[instrument(skip(self), fields(lock.resource = %resource))]
    async fn settle_quorum_ttl(&self, resource: &str) -> LockResult<Option<quorum::QuorumTtl>> {
        let started = self.time_source.now_millis();

        let mut tasks = Vec::with_capacity(self.instances.len());
        for index in 0..self.instances.len() {
            let instances = self.instances.clone();
            let resource = resource.to_string();
            tasks.push(tokio::spawn(async move {
                instances[index].read_ttl(&resource).await
            }));
        }

        let mut readings = Vec::with_capacity(self.instances.len());
        let mut first_error = None;
        for task in tasks {
            match task.await {
                Ok(Ok(Some(reading))) => readings.push(reading),
                Ok(Ok(None)) => {}
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(_) => {}
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        let elapsed = self.time_source.now_millis().saturating_sub(started);
        Ok(quorum::settle_ttl(readings, self.quorum, elapsed))
    }

    fn retry_pause(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.for_attempt(attempt);
        let jitter_millis = self.retry_jitter.as_millis() as u64;
        if jitter_millis == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_millis))
    }
}

/// Releases a token on every exit path of the scope it guards: an attempt
/// being rolled back, or a scoped critical section.
///
/// The ordinary paths call [`release`](Self::release) (awaited fan-out) or
/// [`disarm`](Self::disarm) (the caller keeps the lock); a panic or a
/// cancelled future reaches `Drop` instead, which hands the fan-out to the
/// runtime.
struct UnlockGuard<I: LockInstance + 'static> {
    instances: Arc<Vec<I>>,
    lock: Option<Lock>,
}

impl<I: LockInstance + 'static> UnlockGuard<I> {
    fn new(instances: Arc<Vec<I>>, lock: Lock) -> Self {
        Self {
            instances,
            lock: Some(lock),
        }
    }

    fn disarm(&mut self) {
        self.lock = None;
    }

    async fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            release_on_all(&self.instances, &lock.resource, &lock.value).await;
        }
    }
}

impl<I: LockInstance + 'static> Drop for UnlockGuard<I> {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let instances = self.instances.clone();
        handle.spawn(async move {
            release_on_all(&instances, &lock.resource, &lock.value).await;
        });
    }
}

/// Best-effort release fan-out to every instance, including those that
/// never granted: a grant may have been committed without the coordinator
/// observing it.
async fn release_on_all<I: LockInstance + 'static>(
    instances: &Arc<Vec<I>>,
    resource: &str,
    token: &str,
) {
    let mut tasks = Vec::with_capacity(instances.len());
    for index in 0..instances.len() {
        let instances = instances.clone();
        let resource = resource.to_string();
        let token = token.to_string();
        tasks.push(tokio::spawn(async move {
            instances[index].release(&resource, &token).await;
        }));
    }
    for task in tasks {
        let _ = task.await;
    }
}

/// A settled quorum TTL may be negative once the lock has lapsed; callers
/// treat `None` and zero identically, so it is clamped here.
fn clamp_ttl(settled: quorum::QuorumTtl) -> Duration {
    Duration::from_millis(settled.ttl_millis.max(0) as u64)
}

/// Mints a fresh 128-bit random token.
///
/// The token is the sole proof of ownership; every server-side transition
/// gates on byte-equality with it.
fn mint_token() -> String {
    let mut rng = rand::thread_rng();
    let high: u64 = rng.r#gen();
    let low: u64 = rng.r#gen();
    format!("{high:016x}{low:016x}")
}

/// Builder for a Redis-backed [`LockManager`].
///
/// Servers may be given as URLs, pre-built clients, or pools, in any
/// combination. When nothing is supplied, a single default server is taken
/// from `DEFAULT_REDIS_HOST`/`DEFAULT_REDIS_PORT` (falling back to
/// `localhost`/`6379`).
pub struct LockManagerBuilder {
    urls: Vec<String>,
    clients: Vec<RedisClient>,
    pools: Vec<RedisPool>,
    connection_timeout: Duration,
    retry_count: u32,
    retry_delay: RetryDelay,
    retry_jitter: Duration,
    time_source: TimeSource,
}

impl LockManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            urls: vec![],
            clients: vec![],
            pools: vec![],
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: RetryDelay::Fixed(DEFAULT_RETRY_DELAY),
            retry_jitter: DEFAULT_RETRY_JITTER,
            time_source: TimeSource::monotonic(),
        }
    }

    /// Adds a server URL. For quorum behavior add an odd number, ideally 3
    /// or 5.
    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Adds multiple server URLs.
    pub fn servers(mut self, urls: &[impl AsRef<str>]) -> Self {
        for url in urls {
            self.urls.push(url.as_ref().to_string());
        }
        self
    }

    /// Uses an existing connected client as one server.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.clients.push(client);
        self
    }

    /// Uses an existing connected pool as one server.
    pub fn pool(mut self, pool: RedisPool) -> Self {
        self.pools.push(pool);
        self
    }

    /// Sets the per-server network timeout used when connecting URLs.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the number of additional acquisition attempts after the first.
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the delay between acquisition attempts.
    pub fn retry_delay(mut self, delay: impl Into<RetryDelay>) -> Self {
        self.retry_delay = delay.into();
        self
    }

    /// Sets the upper bound of the random offset added to each delay.
    pub fn retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Replaces the monotonic time source.
    pub fn time_source(mut self, source: TimeSource) -> Self {
        self.time_source = source;
        self
    }

    /// Connects every configured server and builds the manager.
    pub async fn build(self) -> LockResult<LockManager> {
        let mut instances = Vec::new();

        for client in self.clients {
            instances.push(RedisLockInstance::from_client(client).await?);
        }
        for pool in self.pools {
            instances.push(RedisLockInstance::from_pool(pool).await?);
        }

        let mut urls = self.urls;
        if urls.is_empty() && instances.is_empty() {
            urls.push(default_server_url());
        }
        for url in urls {
            instances.push(RedisLockInstance::connect(&url, self.connection_timeout).await?);
        }

        Ok(LockManager::with_instances(instances)?
            .retry_count(self.retry_count)
            .retry_delay(self.retry_delay)
            .retry_jitter(self.retry_jitter)
            .time_source(self.time_source))
    }
}

impl Default for LockManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_server_url() -> String {
    let host =
        std::env::var("DEFAULT_REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("DEFAULT_REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    format!("redis://{host}:{port}")
}
