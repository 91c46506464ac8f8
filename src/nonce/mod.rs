//! Nonce stores for replay attack prevention.
//!
//! Every backend implements [`NonceStore::add_if_not_exists`], an atomic
//! test-and-set with expiry. Any internal failure must return `false` so
//! that a replay cannot get through while a backend is unhealthy.

mod distributed;
mod evict;
mod kv_store;
mod memory;
#[cfg(feature = "redis")]
mod redis_kv;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use distributed::{DistributedNonceStore, DEFAULT_PREFIX, DEFAULT_TIMEOUT};
pub use evict::{EvictPolicy, EvictionPolicy};
pub use kv_store::KvNonceStore;
pub use memory::{MemoryNonceStore, MemoryStoreConfig};
#[cfg(feature = "redis")]
pub use redis_kv::RedisKv;

/// Default lifetime of a nonce record.
pub const DEFAULT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Default interval between background sweeps of the in-process store.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default capacity of the in-process store (roughly 280 MB of UUIDs).
pub const DEFAULT_MAX_SIZE: usize = 2_000_000;

/// Atomic "insert if absent, expire after TTL" keyed by nonce.
///
/// Concurrent callers presenting the same nonce must see exactly one `true`.
#[async_trait]
pub trait NonceStore: Send + Sync {
    async fn add_if_not_exists(&self, nonce: &str) -> bool;
}

#[async_trait]
impl<T: NonceStore + ?Sized> NonceStore for Arc<T> {
    async fn add_if_not_exists(&self, nonce: &str) -> bool {
        (**self).add_if_not_exists(nonce).await
    }
}

#[async_trait]
impl<T: NonceStore + ?Sized> NonceStore for Box<T> {
    async fn add_if_not_exists(&self, nonce: &str) -> bool {
        (**self).add_if_not_exists(nonce).await
    }
}
