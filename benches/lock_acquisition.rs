//! Benchmarks for quorum lock acquisition latency

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use redlock_core::error::LockResult;
use redlock_core::traits::LockInstance;
use redlock_redis::LockManager;

/// In-memory instance so the bench measures coordinator overhead, not
/// network round trips.
#[derive(Default)]
struct InMemoryInstance {
    keys: Mutex<HashMap<String, String>>,
}

impl LockInstance for InMemoryInstance {
    async fn try_acquire(
        &self,
        resource: &str,
        token: &str,
        _ttl: Duration,
        allow_new: bool,
    ) -> LockResult<bool> {
        let mut keys = self.keys.lock().unwrap();
        let granted = match keys.get(resource) {
            None => allow_new,
            Some(value) => value == token,
        };
        if granted {
            keys.insert(resource.to_string(), token.to_string());
        }
        Ok(granted)
    }

    async fn release(&self, resource: &str, token: &str) {
        let mut keys = self.keys.lock().unwrap();
        if keys.get(resource).is_some_and(|value| value == token) {
            keys.remove(resource);
        }
    }

    async fn read_ttl(&self, resource: &str) -> LockResult<Option<(String, i64)>> {
        let keys = self.keys.lock().unwrap();
        Ok(keys.get(resource).map(|value| (value.clone(), 1000)))
    }
}

fn bench_quorum_acquisition(c: &mut Criterion) {
    let instances: Vec<InMemoryInstance> = (0..5).map(|_| InMemoryInstance::default()).collect();
    let manager = LockManager::with_instances(instances)
        .unwrap()
        .retry_count(0);

    let mut group = c.benchmark_group("quorum_lock");
    group.bench_function("lock_unlock", |b| {
        b.to_async(tokio::runtime::Runtime::new().unwrap())
            .iter(|| async {
                if let Ok(Some(lock)) = manager.lock("bench-lock", Duration::from_secs(1)).await {
                    manager.unlock(&lock).await;
                }
            });
    });

    group.bench_function("remaining_ttl", |b| {
        b.to_async(tokio::runtime::Runtime::new().unwrap())
            .iter(|| async {
                let _ = manager.remaining_ttl_for_resource("bench-lock").await;
            });
    });

    group.finish();
}

criterion_group!(benches, bench_quorum_acquisition);
criterion_main!(benches);
