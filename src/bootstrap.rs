//! Assemble an [`HmacProvider`] from [`Settings`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::HmacProvider;
use crate::config::{NonceBackend, Settings};
use crate::error::HmacResult;
use crate::kv::{Kv, MemoryKv};
use crate::nonce::{KvNonceStore, MemoryNonceStore, NonceStore};
use crate::secret::{credential_from_config, EncryptionKey, KeyProvider, MultiKeyProvider};

/// Load every configured key into a provider.
///
/// All credentials are sealed under one process-local encryption key.
/// Keys read from `secret_env` clear their variable, so when any key uses
/// it, call this before other threads exist (before building the Tokio
/// runtime) and hand the result to [`build_provider_with_keys`].
pub fn build_key_provider(settings: &Settings) -> HmacResult<Arc<MultiKeyProvider>> {
    let encryption_key = EncryptionKey::generate()?;
    let provider = MultiKeyProvider::new();

    for key in &settings.keys {
        let credential = credential_from_config(key, &encryption_key)?;
        provider.insert(key.key_id.clone(), credential)?;
    }

    info!(keys = provider.len(), "HMAC keys loaded");
    Ok(Arc::new(provider))
}

/// Create the configured nonce store. Must be called inside a Tokio runtime.
pub async fn build_nonce_store(settings: &Settings) -> HmacResult<Arc<dyn NonceStore>> {
    let nonce = &settings.nonce;
    match nonce.backend {
        NonceBackend::Memory => {
            info!(
                max_size = nonce.max_size,
                ttl_seconds = nonce.ttl_seconds,
                evict_policy = %nonce.evict_policy,
                "Using in-memory nonce store"
            );
            let store: Arc<dyn NonceStore> = MemoryNonceStore::spawn(nonce.memory_store_config());
            Ok(store)
        }
        NonceBackend::Redis => build_redis_store(settings).await,
        NonceBackend::Kv => {
            warn!("Using key-value nonce store; replay protection is best-effort");
            let kv = Arc::new(MemoryKv::new());
            spawn_prune_task(&kv, Duration::from_secs(nonce.cleanup_interval_seconds));
            let store: Arc<dyn NonceStore> =
                Arc::new(KvNonceStore::new(kv, nonce.ttl()).with_prefix(nonce.prefix.clone()));
            Ok(store)
        }
    }
}

#[cfg(feature = "redis")]
async fn build_redis_store(settings: &Settings) -> HmacResult<Arc<dyn NonceStore>> {
    use crate::nonce::{DistributedNonceStore, RedisKv};

    let nonce = &settings.nonce;
    let client = RedisKv::connect(&settings.redis.url).await?;
    let store: Arc<dyn NonceStore> = Arc::new(
        DistributedNonceStore::new(client, nonce.ttl())
            .with_timeout(nonce.timeout())
            .with_prefix(nonce.prefix.clone()),
    );
    Ok(store)
}

#[cfg(not(feature = "redis"))]
async fn build_redis_store(_settings: &Settings) -> HmacResult<Arc<dyn NonceStore>> {
    Err(crate::error::HmacError::Config {
        message: "Nonce backend 'redis' requires the 'redis' feature".to_string(),
    })
}

/// Periodically drop expired records from an in-process key-value store.
fn spawn_prune_task(kv: &Arc<MemoryKv>, period: Duration) {
    let kv = Arc::downgrade(kv);
    tokio::spawn(async move {
        let mut interval_timer =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval_timer.tick().await;
            let Some(strong) = kv.upgrade() else { break };
            if let Err(e) = strong.prune().await {
                warn!(error = %e, "Failed to prune key-value store");
            }
        }
        debug!("Key-value prune task stopped");
    });
}

/// Build a provider with keys, nonce store and limits from `settings`.
///
/// Loads the keys in place; see [`build_key_provider`] for configurations
/// with `secret_env` keys.
pub async fn build_provider(settings: &Settings) -> HmacResult<HmacProvider> {
    let key_provider = build_key_provider(settings)?;
    build_provider_with_keys(settings, key_provider).await
}

/// Build a provider around keys that were loaded earlier.
pub async fn build_provider_with_keys(
    settings: &Settings,
    key_provider: Arc<dyn KeyProvider>,
) -> HmacResult<HmacProvider> {
    let nonce_store = build_nonce_store(settings).await?;

    Ok(HmacProvider::builder(key_provider)
        .with_nonce_store(nonce_store)
        .with_key_interval(settings.authenticator.key_interval())
        .with_max_input_size(settings.authenticator.max_input_size)
        .build())
}
