//! Example: quorum locking over Redis
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set DEFAULT_REDIS_HOST / DEFAULT_REDIS_PORT
//! to point somewhere other than localhost:6379.

use std::time::Duration;

use redlock::LockManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Connecting...");
    let manager = LockManager::builder().build().await?;

    // Acquire a lock for one second of exclusivity.
    let Some(lock) = manager.lock("example-resource", Duration::from_secs(1)).await? else {
        println!("Lock is held elsewhere, giving up");
        return Ok(());
    };
    println!(
        "Acquired {} with token {} (safe for {:?})",
        lock.resource, lock.value, lock.validity
    );

    // Renew it before it lapses.
    if let Some(extended) = manager.extend_if_still_locked(&lock, Duration::from_secs(1)).await? {
        println!("Extended, now safe for {:?}", extended.validity);
    }

    if let Some(remaining) = manager.remaining_ttl_for_lock(&lock).await? {
        println!("Servers report {remaining:?} remaining");
    }

    manager.unlock(&lock).await;
    println!("Released");

    // The scoped form guarantees release on every exit path.
    let answer = manager
        .with_lock_strict("example-scoped", Duration::from_secs(1), |lock| async move {
            println!("Critical section holding {}", lock.resource);
            42
        })
        .await?;
    println!("Critical section returned {answer}");

    Ok(())
}
