//! In-memory nonce store for replay attack prevention.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{EvictPolicy, EvictionPolicy, NonceStore};
use super::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_SIZE, DEFAULT_TTL};

/// Settings for [`MemoryNonceStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Time-to-live for nonces.
    pub ttl: Duration,
    /// Period of the background sweep.
    pub cleanup_interval: Duration,
    /// Maximum number of stored nonces.
    pub max_size: usize,
    /// What to drop when the store is full.
    pub evict_policy: EvictPolicy,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_size: DEFAULT_MAX_SIZE,
            evict_policy: EvictPolicy::None,
        }
    }
}

enum Sweeper {
    Idle,
    Running(oneshot::Sender<()>),
    Closed,
}

/// Thread-safe, bounded in-memory nonce store with TTL-based expiry.
///
/// Suitable for single-instance deployments. Nonces are lost on restart.
pub struct MemoryNonceStore {
    /// Map of nonce -> expiry time.
    nonces: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    cleanup_interval: Duration,
    max_size: usize,
    evict_policy: Arc<dyn EvictionPolicy>,
    sweeper: Mutex<Sweeper>,
}

impl MemoryNonceStore {
    /// Create a store without a background sweeper.
    ///
    /// Expired entries are still reclaimed on lookup and when the store
    /// reaches capacity.
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            nonces: Mutex::new(HashMap::new()),
            ttl: config.ttl,
            cleanup_interval: config.cleanup_interval,
            max_size: config.max_size,
            evict_policy: Arc::new(config.evict_policy),
            sweeper: Mutex::new(Sweeper::Idle),
        }
    }

    /// Create a store and start its cleanup task. Requires a Tokio runtime.
    pub fn spawn(config: MemoryStoreConfig) -> Arc<Self> {
        let store = Arc::new(Self::new(config));
        store.start_cleanup_task();
        store
    }

    /// Replace the eviction policy with a custom one.
    pub fn with_eviction_policy(mut self, policy: impl EvictionPolicy + 'static) -> Self {
        self.evict_policy = Arc::new(policy);
        self
    }

    /// Time-to-live applied to new nonces.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the current number of stored nonces (for monitoring).
    pub fn len(&self) -> usize {
        self.lock_nonces().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force cleanup of expired nonces.
    pub fn cleanup(&self) {
        let mut nonces = self.lock_nonces();
        let before = nonces.len();
        remove_expired(&mut nonces, Instant::now());
        let removed = before - nonces.len();
        if removed > 0 {
            debug!(removed, remaining = nonces.len(), "Expired nonces removed");
        }
    }

    /// Start the background cleanup task.
    ///
    /// The task holds a weak reference and exits when the store is dropped
    /// or [`close`](Self::close) is called. Calling this twice, or after
    /// `close`, has no effect.
    pub fn start_cleanup_task(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*sweeper, Sweeper::Idle) {
            return;
        }

        let (tx, mut rx) = oneshot::channel();
        *sweeper = Sweeper::Running(tx);

        let store = Arc::downgrade(self);
        let period = self.cleanup_interval;
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let Some(strong) = store.upgrade() else { break };
                        strong.cleanup();
                    }
                    _ = &mut rx => break,
                }
            }
            debug!("Nonce cleanup task stopped");
        });
    }

    /// Stop the background cleanup task. Idempotent.
    pub fn close(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Sweeper::Running(tx) = std::mem::replace(&mut *sweeper, Sweeper::Closed) {
            let _ = tx.send(());
        }
    }

    /// Check if a nonce has been used, and store it if not.
    fn check_and_store_sync(&self, nonce: &str) -> bool {
        let mut nonces = self.lock_nonces();
        let now = Instant::now();

        if let Some(expiry) = nonces.get(nonce) {
            if now < *expiry {
                return false;
            }
            // Expired - remove and allow reuse
            nonces.remove(nonce);
        }

        if nonces.len() >= self.max_size {
            remove_expired(&mut nonces, now);

            if nonces.len() >= self.max_size {
                let before = nonces.len();
                self.evict_policy.evict(&mut nonces, self.ttl, now);
                warn!(
                    policy = self.evict_policy.name(),
                    evicted = before.saturating_sub(nonces.len()),
                    max_size = self.max_size,
                    "Nonce store at capacity"
                );
            }

            if nonces.len() >= self.max_size {
                return false;
            }
        }

        nonces.insert(nonce.to_string(), now + self.ttl);
        true
    }

    fn lock_nonces(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // Recover from mutex poisoning
        self.nonces.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl Drop for MemoryNonceStore {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn add_if_not_exists(&self, nonce: &str) -> bool {
        self.check_and_store_sync(nonce)
    }
}

fn remove_expired(nonces: &mut HashMap<String, Instant>, now: Instant) {
    nonces.retain(|_, expiry| *expiry > now);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ttl: Duration, max_size: usize, evict_policy: EvictPolicy) -> MemoryStoreConfig {
        MemoryStoreConfig {
            ttl,
            cleanup_interval: Duration::from_secs(60),
            max_size,
            evict_policy,
        }
    }

    #[tokio::test]
    async fn test_new_nonce_accepted() {
        let store = MemoryNonceStore::default();
        assert!(store.add_if_not_exists("nonce1").await);
        assert!(store.add_if_not_exists("nonce2").await);
    }

    #[tokio::test]
    async fn test_duplicate_nonce_rejected() {
        let store = MemoryNonceStore::default();
        assert!(store.add_if_not_exists("nonce1").await);
        assert!(!store.add_if_not_exists("nonce1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_nonce_accepted_again() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(10), 100, EvictPolicy::None));
        assert!(store.add_if_not_exists("nonce1").await);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!store.add_if_not_exists("nonce1").await);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.add_if_not_exists("nonce1").await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_len_and_cleanup() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(10), 100, EvictPolicy::None));
        store.check_and_store_sync("nonce1");
        store.check_and_store_sync("nonce2");
        assert_eq!(store.len(), 2);

        store.cleanup();
        assert_eq!(store.len(), 2); // Not expired yet

        tokio::time::advance(Duration::from_secs(11)).await;
        store.cleanup();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_with_evict_none_fails_closed() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(60), 3, EvictPolicy::None));
        for nonce in ["a", "b", "c"] {
            assert!(store.add_if_not_exists(nonce).await);
        }
        assert!(!store.add_if_not_exists("d").await);
        assert_eq!(store.len(), 3);
        // existing nonces are still rejected
        assert!(!store.add_if_not_exists("a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_reclaims_expired_first() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(10), 2, EvictPolicy::None));
        assert!(store.add_if_not_exists("a").await);
        assert!(store.add_if_not_exists("b").await);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.add_if_not_exists("c").await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_with_evict_all() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(60), 3, EvictPolicy::All));
        for nonce in ["a", "b", "c"] {
            assert!(store.add_if_not_exists(nonce).await);
        }
        assert!(store.add_if_not_exists("d").await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_with_evict_half_life() {
        let store =
            MemoryNonceStore::new(config(Duration::from_secs(100), 3, EvictPolicy::HalfLife));
        assert!(store.add_if_not_exists("old").await);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.add_if_not_exists("young1").await);
        assert!(store.add_if_not_exists("young2").await);

        assert!(store.add_if_not_exists("new").await);
        assert_eq!(store.len(), 3);
        assert!(!store.lock_nonces().contains_key("old"));
        assert!(!store.add_if_not_exists("young1").await);
        // nothing left that is older than half the TTL
        assert!(!store.add_if_not_exists("another").await);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_size() {
        for policy in [EvictPolicy::None, EvictPolicy::All, EvictPolicy::HalfLife] {
            let store = MemoryNonceStore::new(config(Duration::from_secs(60), 16, policy));
            for i in 0..200 {
                store.add_if_not_exists(&format!("nonce-{}", i)).await;
                assert!(store.len() <= 16);
            }
        }
    }

    struct DropOne;

    impl EvictionPolicy for DropOne {
        fn name(&self) -> &'static str {
            "drop_one"
        }

        fn evict(&self, nonces: &mut HashMap<String, Instant>, _ttl: Duration, _now: Instant) {
            if let Some(key) = nonces.keys().next().cloned() {
                nonces.remove(&key);
            }
        }
    }

    #[tokio::test]
    async fn test_custom_eviction_policy() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(60), 2, EvictPolicy::None))
            .with_eviction_policy(DropOne);
        assert!(store.add_if_not_exists("a").await);
        assert!(store.add_if_not_exists("b").await);
        assert!(store.add_if_not_exists("c").await);
        assert_eq!(store.len(), 2);
    }

    struct AddOne;

    impl EvictionPolicy for AddOne {
        fn name(&self) -> &'static str {
            "add_one"
        }

        fn evict(&self, nonces: &mut HashMap<String, Instant>, ttl: Duration, now: Instant) {
            nonces.insert(format!("extra-{}", nonces.len()), now + ttl);
        }
    }

    #[tokio::test]
    async fn test_policy_that_grows_store_refuses_insert() {
        let store = MemoryNonceStore::new(config(Duration::from_secs(60), 2, EvictPolicy::None))
            .with_eviction_policy(AddOne);
        assert!(store.add_if_not_exists("a").await);
        assert!(store.add_if_not_exists("b").await);

        assert!(!store.add_if_not_exists("c").await);
        assert_eq!(store.len(), 3);
        assert!(!store.add_if_not_exists("a").await);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_exactly_one_wins() {
        let store = Arc::new(MemoryNonceStore::default());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add_if_not_exists("shared").await
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup_and_close() {
        let store =
            MemoryNonceStore::spawn(config(Duration::from_secs(10), 100, EvictPolicy::None));
        assert!(store.add_if_not_exists("nonce1").await);

        // Sweep runs at t=60s; entries expired at t=10s
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());

        store.close();
        store.close();
        assert!(store.add_if_not_exists("nonce2").await);
        tokio::time::sleep(Duration::from_secs(121)).await;
        // no sweeper any more; expired entry stays until touched
        assert_eq!(store.len(), 1);
    }
}
