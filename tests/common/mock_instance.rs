//! Mock lock instance for exercising the coordinator without servers.

#![allow(clippy::disallowed_types, clippy::disallowed_methods)] // Allow std::sync::Mutex for test mocks

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redlock_core::error::{LockError, LockResult};
use redlock_core::traits::LockInstance;

/// In-memory stand-in for one backing server.
///
/// Keys expire by wall clock like Redis `PX` keys. Two failure modes are
/// injectable: `down` makes the server unreachable (connection failures,
/// which the adapter absorbs), `failing` makes it answer every command
/// with a server error (which the adapter propagates).
#[derive(Default)]
pub struct MockServer {
    keys: Mutex<HashMap<String, (String, Instant)>>,
    down: AtomicBool,
    failing: AtomicBool,
    release_calls: AtomicUsize,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A set of `count` independent servers.
    pub fn fleet(count: usize) -> Vec<Arc<Self>> {
        (0..count).map(|_| Self::new()).collect()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::Relaxed);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// How many release commands reached this server.
    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::Relaxed)
    }

    /// The unexpired token currently held on `resource`, if any.
    pub fn holder(&self, resource: &str) -> Option<String> {
        let mut keys = self.keys.lock().unwrap();
        Self::purge_expired(&mut keys, resource);
        keys.get(resource).map(|(value, _)| value.clone())
    }

    /// Seeds a key directly, bypassing the lock protocol.
    pub fn force_set(&self, resource: &str, value: &str, ttl: Duration) {
        let mut keys = self.keys.lock().unwrap();
        keys.insert(
            resource.to_string(),
            (value.to_string(), Instant::now() + ttl),
        );
    }

    /// Drops a key directly, emulating expiry.
    pub fn force_remove(&self, resource: &str) {
        self.keys.lock().unwrap().remove(resource);
    }

    fn purge_expired(keys: &mut HashMap<String, (String, Instant)>, resource: &str) {
        if keys
            .get(resource)
            .is_some_and(|(_, expires_at)| *expires_at <= Instant::now())
        {
            keys.remove(resource);
        }
    }

    fn injected_error() -> LockError {
        LockError::Backend(Box::new(std::io::Error::other("injected server error")))
    }
}

/// Adapter over one [`MockServer`], mirroring the Redis adapter's error
/// policy: unreachable servers are non-grants on acquire and dropped
/// responses on read, while command errors propagate.
pub struct MockInstance {
    server: Arc<MockServer>,
}

impl MockInstance {
    pub fn new(server: &Arc<MockServer>) -> Self {
        Self {
            server: server.clone(),
        }
    }

    /// One instance per server in the fleet.
    pub fn fleet(servers: &[Arc<MockServer>]) -> Vec<Self> {
        servers.iter().map(Self::new).collect()
    }
}

impl LockInstance for MockInstance {
    async fn try_acquire(
        &self,
        resource: &str,
        token: &str,
        ttl: Duration,
        allow_new: bool,
    ) -> LockResult<bool> {
        if self.server.down.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if self.server.failing.load(Ordering::Relaxed) {
            return Err(MockServer::injected_error());
        }

        let mut keys = self.server.keys.lock().unwrap();
        MockServer::purge_expired(&mut keys, resource);
        let granted = match keys.get(resource) {
            None => allow_new,
            Some((value, _)) => value == token,
        };
        if granted {
            keys.insert(
                resource.to_string(),
                (token.to_string(), Instant::now() + ttl),
            );
        }
        Ok(granted)
    }

    async fn release(&self, resource: &str, token: &str) {
        self.server.release_calls.fetch_add(1, Ordering::Relaxed);
        if self.server.down.load(Ordering::Relaxed) || self.server.failing.load(Ordering::Relaxed)
        {
            return;
        }

        let mut keys = self.server.keys.lock().unwrap();
        if keys
            .get(resource)
            .is_some_and(|(value, _)| value == token)
        {
            keys.remove(resource);
        }
    }

    async fn read_ttl(&self, resource: &str) -> LockResult<Option<(String, i64)>> {
        if self.server.down.load(Ordering::Relaxed) {
            return Ok(None);
        }
        if self.server.failing.load(Ordering::Relaxed) {
            return Err(MockServer::injected_error());
        }

        let mut keys = self.server.keys.lock().unwrap();
        MockServer::purge_expired(&mut keys, resource);
        Ok(keys.get(resource).map(|(value, expires_at)| {
            let remaining = expires_at.saturating_duration_since(Instant::now());
            (value.clone(), remaining.as_millis() as i64)
        }))
    }
}
