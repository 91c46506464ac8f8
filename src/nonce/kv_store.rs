//! Nonce store over a plain [`Kv`] backend.

use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use crate::kv::Kv;

use super::NonceStore;

/// Best-effort nonce store for backends without an atomic set-if-absent.
///
/// Performs `get` followed by `set_with_ttl`. Two concurrent requests with
/// the same nonce can both pass between those calls, so this store is only
/// safe behind a single writer. Do not use it behind replicated or
/// multi-writer front ends; prefer [`DistributedNonceStore`] or
/// [`MemoryNonceStore`] there.
///
/// [`DistributedNonceStore`]: super::DistributedNonceStore
/// [`MemoryNonceStore`]: super::MemoryNonceStore
pub struct KvNonceStore<K> {
    kv: K,
    ttl: Duration,
    prefix: String,
}

impl<K: Kv> KvNonceStore<K> {
    /// Create a store writing nonces under their own name.
    pub fn new(kv: K, ttl: Duration) -> Self {
        Self {
            kv,
            ttl,
            prefix: String::new(),
        }
    }

    /// Prepend `prefix` to every nonce key, for backends shared with other data.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }
}

#[async_trait]
impl<K: Kv> NonceStore for KvNonceStore<K> {
    async fn add_if_not_exists(&self, nonce: &str) -> bool {
        let key = format!("{}{}", self.prefix, nonce);
        match self.kv.get(&key).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Nonce lookup failed, rejecting nonce");
                return false;
            }
        }

        if let Err(e) = self.kv.set_with_ttl(&key, b"1", self.ttl).await {
            error!(error = %e, "Failed to store nonce, rejecting it");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HmacError, HmacResult, KvErrorKind};
    use crate::kv::MemoryKv;

    /// Reads succeed, writes fail.
    struct ReadOnlyKv;

    #[async_trait]
    impl Kv for ReadOnlyKv {
        async fn get(&self, _key: &str) -> HmacResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &[u8]) -> HmacResult<()> {
            Err(read_only())
        }

        async fn set_with_ttl(&self, _key: &str, _value: &[u8], _ttl: Duration) -> HmacResult<()> {
            Err(read_only())
        }

        async fn delete(&self, _key: &str) -> HmacResult<()> {
            Err(read_only())
        }

        async fn prune(&self) -> HmacResult<()> {
            Ok(())
        }
    }

    fn read_only() -> HmacError {
        HmacError::Kv {
            kind: KvErrorKind::Unavailable {
                message: "read only".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_add_if_not_exists() {
        let store = KvNonceStore::new(MemoryKv::new(), Duration::from_secs(60));
        assert!(store.add_if_not_exists("abc").await);
        assert!(!store.add_if_not_exists("abc").await);
        assert_eq!(store.kv().len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_applied() {
        let store =
            KvNonceStore::new(MemoryKv::new(), Duration::from_secs(60)).with_prefix("nonce:");
        assert!(store.add_if_not_exists("abc").await);
        assert!(store.kv().get("nonce:abc").await.unwrap().is_some());
        assert!(store.kv().get("abc").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_nonce_accepted_again() {
        let store = KvNonceStore::new(MemoryKv::new(), Duration::from_secs(60));
        assert!(store.add_if_not_exists("abc").await);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.add_if_not_exists("abc").await);
    }

    #[tokio::test]
    async fn test_write_failure_fails_closed() {
        let store = KvNonceStore::new(ReadOnlyKv, Duration::from_secs(60));
        assert!(!store.add_if_not_exists("abc").await);
    }
}
