//! One backing Redis server.

use std::time::Duration;

use fred::clients::RedisPool;
use fred::prelude::*;
use fred::types::FromRedis;
use redlock_core::error::{LockError, LockResult};
use redlock_core::traits::LockInstance;
use tokio::sync::RwLock;

use crate::scripts::{self, ScriptKind, ScriptShas};

/// Command executor behind an instance.
///
/// A bare client acts as its own pool-of-one; a pool hands out a member
/// client per operation. Either way every server operation goes through
/// [`Connection::checkout`], so the checkout discipline is uniform on the
/// hot path.
enum Connection {
    Client(RedisClient),
    Pool(RedisPool),
}

impl Connection {
    fn checkout(&self) -> &RedisClient {
        match self {
            Self::Client(client) => client,
            Self::Pool(pool) => pool.next(),
        }
    }
}

/// Adapter over a single Redis server.
///
/// Uploads the three scripted primitives at construction and exposes the
/// atomic operations the quorum coordinator fans out to. The only mutable
/// state is the cached script digests, which are reloaded transparently
/// when the server reports a flushed script cache.
pub struct RedisLockInstance {
    connection: Connection,
    shas: RwLock<ScriptShas>,
}

impl RedisLockInstance {
    /// Connects to `url` with the given network timeout and prepares the
    /// instance.
    pub async fn connect(url: &str, timeout: Duration) -> LockResult<Self> {
        let config = RedisConfig::from_url(url)
            .map_err(|error| LockError::Connection(Box::new(error)))?;
        let perf = PerformanceConfig {
            default_command_timeout: timeout,
            ..Default::default()
        };
        let connection = ConnectionConfig {
            connection_timeout: timeout,
            ..Default::default()
        };
        let client = RedisClient::new(config, Some(perf), Some(connection), None);
        client.connect();
        client
            .wait_for_connect()
            .await
            .map_err(|error| LockError::Connection(Box::new(error)))?;

        Self::with_connection(Connection::Client(client)).await
    }

    /// Wraps a pre-built, already-connected client.
    pub async fn from_client(client: RedisClient) -> LockResult<Self> {
        Self::with_connection(Connection::Client(client)).await
    }

    /// Wraps a pre-built, already-connected pool.
    pub async fn from_pool(pool: RedisPool) -> LockResult<Self> {
        Self::with_connection(Connection::Pool(pool)).await
    }

    async fn with_connection(connection: Connection) -> LockResult<Self> {
        let shas = load_scripts(connection.checkout())
            .await
            .map_err(|error| LockError::Connection(Box::new(error)))?;
        Ok(Self {
            connection,
            shas: RwLock::new(shas),
        })
    }

    /// Runs one of the prepared scripts by digest.
    ///
    /// If the server rejects the digest with `NOSCRIPT` (its script cache
    /// was flushed), all three scripts are reloaded and the call retried
    /// exactly once; a second failure propagates.
    async fn run_script<R>(
        &self,
        kind: ScriptKind,
        resource: &str,
        args: Vec<RedisValue>,
    ) -> Result<R, RedisError>
    where
        R: FromRedis,
    {
        let client = self.connection.checkout();
        let sha = self.shas.read().await.sha(kind).to_owned();
        match client
            .evalsha::<R, _, _, _>(sha, vec![resource], args.clone())
            .await
        {
            Err(error) if is_noscript(&error) => {
                let reloaded = load_scripts(client).await?;
                let sha = reloaded.sha(kind).to_owned();
                *self.shas.write().await = reloaded;
                client.evalsha(sha, vec![resource], args).await
            }
            result => result,
        }
    }
}

impl LockInstance for RedisLockInstance {
    async fn try_acquire(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
        allow_new: bool,
    ) -> LockResult<bool> {
        let allow_new = if allow_new { "yes" } else { "no" };
        let args: Vec<RedisValue> = vec![
            token.into(),
            (ttl.as_millis() as i64).into(),
            allow_new.into(),
        ];

        match self
            .run_script::<Option<String>>(ScriptKind::Lock, resource, args)
            .await
        {
            Ok(reply) => Ok(reply.is_some()),
            Err(error) if is_connection_error(&error) => {
                tracing::debug!(resource, error = %error, "acquire unreachable, counted as non-grant");
                Ok(false)
            }
            Err(error) => Err(LockError::Backend(Box::new(error))),
        }
    }

    async fn release(&self, resource: &str, token: &str) {
        let args: Vec<RedisValue> = vec![token.into()];
        if let Err(error) = self
            .run_script::<i64>(ScriptKind::Unlock, resource, args)
            .await
        {
            tracing::debug!(resource, error = %error, "best-effort release failed");
        }
    }

    async fn read_ttl(&self, resource: &str) -> LockResult<Option<(String, i64)>> {
        match self
            .run_script::<(Option<String>, i64)>(ScriptKind::Pttl, resource, vec![])
            .await
        {
            Ok((Some(value), pttl)) => Ok(Some((value, pttl))),
            Ok((None, _)) => Ok(None),
            Err(error) if is_connection_error(&error) => {
                tracing::debug!(resource, error = %error, "ttl read unreachable, response dropped");
                Ok(None)
            }
            Err(error) => Err(LockError::Backend(Box::new(error))),
        }
    }
}

async fn load_scripts(client: &RedisClient) -> Result<ScriptShas, RedisError> {
    Ok(ScriptShas {
        lock: client.script_load(scripts::LOCK).await?,
        unlock: client.script_load(scripts::UNLOCK).await?,
        pttl: client.script_load(scripts::PTTL).await?,
    })
}

fn is_noscript(error: &RedisError) -> bool {
    error.details().starts_with("NOSCRIPT")
}

fn is_connection_error(error: &RedisError) -> bool {
    matches!(
        error.kind(),
        RedisErrorKind::IO | RedisErrorKind::Timeout | RedisErrorKind::Canceled
    )
}
