//! Key-value contracts used by the nonce store backends.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::HmacResult;

pub use memory::MemoryKv;

/// Minimal key-value contract.
///
/// `get` returns `Ok(None)` for missing or expired keys.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> HmacResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> HmacResult<()>;

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<()>;

    async fn delete(&self, key: &str) -> HmacResult<()>;

    /// Remove expired records.
    async fn prune(&self) -> HmacResult<()>;
}

/// Backends offering an atomic "set if absent, expire after TTL".
#[async_trait]
pub trait AtomicKv: Send + Sync {
    /// Returns `Ok(true)` only if the key did not exist and was written.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<bool>;
}

#[async_trait]
impl<T: Kv + ?Sized> Kv for Arc<T> {
    async fn get(&self, key: &str) -> HmacResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> HmacResult<()> {
        (**self).set(key, value).await
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<()> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> HmacResult<()> {
        (**self).delete(key).await
    }

    async fn prune(&self) -> HmacResult<()> {
        (**self).prune().await
    }
}

#[async_trait]
impl<T: AtomicKv + ?Sized> AtomicKv for Arc<T> {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }
}
