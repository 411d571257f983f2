//! Distributed locks over independent Redis servers, via the Redlock
//! algorithm.
//!
//! A [`LockManager`] fans each acquisition out to a set of servers that
//! know nothing of each other and grants the lock only when a strict
//! majority agreed, for the portion of the requested TTL not already
//! consumed by fan-out latency and clock drift.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use redlock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = LockManager::builder()
//!         .server("redis://127.0.0.1:6389")
//!         .server("redis://127.0.0.1:6399")
//!         .server("redis://127.0.0.1:6379")
//!         .build()
//!         .await?;
//!
//!     if let Some(lock) = manager.lock("my-resource", Duration::from_secs(1)).await? {
//!         // Exclusive for at most `lock.validity`.
//!         println!("holding for up to {:?}", lock.validity);
//!         manager.unlock(&lock).await;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Scoped form
//!
//! The scoped forms guarantee release on every exit path of the critical
//! section, including panics and cancellation:
//!
//! ```rust,no_run
//! # use redlock::*;
//! # use std::time::Duration;
//! # async fn example(manager: LockManager) -> LockResult<()> {
//! let answer = manager
//!     .with_lock_strict("my-resource", Duration::from_secs(1), |_lock| async { 42 })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `redlock-core`: descriptor, options, errors, the instance trait
//! - `redlock-redis`: the Redis instance adapter and the quorum manager
//!
//! For fine-grained control, depend on the individual crates instead.

// Re-export core types and traits
pub use redlock_core::*;

// Re-export the Redis backend
pub use redlock_redis::*;
