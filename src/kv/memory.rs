//! In-process key-value store with per-record TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::HmacResult;

use super::{AtomicKv, Kv};

struct Record {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe in-memory key-value store.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, Record>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included until pruned.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(
            key.to_string(),
            Record {
                data: value.to_vec(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> HmacResult<Option<Vec<u8>>> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match data.get(key) {
            None => return Ok(None),
            Some(record) if !record.is_expired(now) => return Ok(Some(record.data.clone())),
            Some(_) => {}
        }
        data.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8]) -> HmacResult<()> {
        self.insert(key, value, None);
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<()> {
        self.insert(key, value, Some(ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> HmacResult<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    async fn prune(&self) -> HmacResult<()> {
        let now = Instant::now();
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, record| !record.is_expired(now));
        Ok(())
    }
}

#[async_trait]
impl AtomicKv for MemoryKv {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> HmacResult<bool> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if data.get(key).is_some_and(|record| !record.is_expired(now)) {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Record {
                data: value.to_vec(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let kv = MemoryKv::new();
        assert!(kv.get("a").await.unwrap().is_none());

        kv.set("a", b"1").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(b"1".to_vec()));

        kv.delete("a").await.unwrap();
        assert!(kv.get("a").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_and_prune() {
        let kv = MemoryKv::new();
        kv.set_with_ttl("short", b"1", Duration::from_secs(10)).await.unwrap();
        kv.set("forever", b"1").await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(kv.len(), 2);
        kv.prune().await.unwrap();
        assert_eq!(kv.len(), 1);
        assert!(kv.get("short").await.unwrap().is_none());
        assert!(kv.get("forever").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent() {
        let kv = MemoryKv::new();
        let ttl = Duration::from_secs(60);
        assert!(kv.set_if_absent("n", b"1", ttl).await.unwrap());
        assert!(!kv.set_if_absent("n", b"1", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(kv.set_if_absent("n", b"1", ttl).await.unwrap());
    }
}
