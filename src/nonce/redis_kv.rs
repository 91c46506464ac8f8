//! Redis client for [`DistributedNonceStore`](super::DistributedNonceStore).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::error::{HmacError, HmacResult, KvErrorKind};
use crate::kv::AtomicKv;

/// Redis connection implementing `SET key value NX PX ttl`.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> HmacResult<Self> {
        let client = redis::Client::open(url).map_err(|e| HmacError::Config {
            message: format!("Invalid Redis URL '{}': {}", url, e),
        })?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        info!("Connected to Redis nonce backend");
        Ok(Self { manager })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AtomicKv for RedisKv {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<bool> {
        let mut conn = self.manager.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        // SET NX replies OK when written and nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }
}

fn unavailable(e: redis::RedisError) -> HmacError {
    HmacError::Kv {
        kind: KvErrorKind::Unavailable {
            message: e.to_string(),
        },
    }
}
