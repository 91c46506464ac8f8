//! Nonce store over a shared key-value backend with atomic SETNX.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::kv::AtomicKv;

use super::{NonceStore, DEFAULT_TTL};

/// Default per-call deadline for backend operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default prefix prepended to nonce keys.
pub const DEFAULT_PREFIX: &str = "nonce:";

/// Nonce store backed by a distributed store such as Redis.
///
/// Each nonce is written as `"<prefix><nonce>" = "1"` with a single atomic
/// set-if-absent carrying the TTL. Timeouts and backend errors reject the
/// nonce.
pub struct DistributedNonceStore<C> {
    client: C,
    ttl: Duration,
    timeout: Duration,
    prefix: String,
}

impl<C: AtomicKv> DistributedNonceStore<C> {
    pub fn new(client: C, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            timeout: DEFAULT_TIMEOUT,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Access the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: AtomicKv + Default> Default for DistributedNonceStore<C> {
    fn default() -> Self {
        Self::new(C::default(), DEFAULT_TTL)
    }
}

#[async_trait]
impl<C: AtomicKv> NonceStore for DistributedNonceStore<C> {
    async fn add_if_not_exists(&self, nonce: &str) -> bool {
        let key = format!("{}{}", self.prefix, nonce);
        match timeout(self.timeout, self.client.set_if_absent(&key, b"1", self.ttl)).await {
            Ok(Ok(added)) => added,
            Ok(Err(e)) => {
                error!(error = %e, "Nonce backend failed, rejecting nonce");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Nonce backend timed out, rejecting nonce"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HmacError, HmacResult, KvErrorKind};
    use crate::kv::MemoryKv;

    struct FailingKv;

    #[async_trait]
    impl AtomicKv for FailingKv {
        async fn set_if_absent(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Duration,
        ) -> HmacResult<bool> {
            Err(HmacError::Kv {
                kind: KvErrorKind::Unavailable {
                    message: "connection refused".to_string(),
                },
            })
        }
    }

    struct SlowKv;

    #[async_trait]
    impl AtomicKv for SlowKv {
        async fn set_if_absent(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Duration,
        ) -> HmacResult<bool> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_add_if_not_exists() {
        let store = DistributedNonceStore::new(MemoryKv::new(), Duration::from_secs(60));
        assert!(store.add_if_not_exists("abc").await);
        assert!(!store.add_if_not_exists("abc").await);
        assert!(store.add_if_not_exists("def").await);
    }

    #[tokio::test]
    async fn test_prefix_applied() {
        use crate::kv::Kv;

        let store = DistributedNonceStore::new(MemoryKv::new(), Duration::from_secs(60))
            .with_prefix("app:");
        assert!(store.add_if_not_exists("abc").await);
        assert_eq!(
            store.client().get("app:abc").await.unwrap(),
            Some(b"1".to_vec())
        );
        assert!(store.client().get("nonce:abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_error_fails_closed() {
        let store = DistributedNonceStore::new(FailingKv, Duration::from_secs(60));
        assert!(!store.add_if_not_exists("abc").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_closed() {
        let store = DistributedNonceStore::new(SlowKv, Duration::from_secs(60))
            .with_timeout(Duration::from_millis(100));
        assert!(!store.add_if_not_exists("abc").await);
    }
}
