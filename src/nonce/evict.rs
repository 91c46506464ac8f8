//! Eviction policies for the in-process nonce store.
//!
//! A policy runs under the store lock once the store is at capacity and a
//! sweep of expired entries did not free any room.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

/// Decides which live nonces to drop when the store is full.
pub trait EvictionPolicy: Send + Sync {
    /// Policy name, used in logs.
    fn name(&self) -> &'static str;

    /// Remove entries from `nonces` (nonce -> expiry instant).
    fn evict(&self, nonces: &mut HashMap<String, Instant>, ttl: Duration, now: Instant);
}

/// Built-in eviction policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictPolicy {
    /// Refuse new nonces while full.
    #[default]
    None,
    /// Drop every entry.
    ///
    /// Replay protection is void for the nonces that were dropped until
    /// their timestamps leave the freshness window. Only enable this when
    /// upstream rate limits make replay floods implausible.
    All,
    /// Drop entries older than half of the TTL.
    HalfLife,
}

impl EvictionPolicy for EvictPolicy {
    fn name(&self) -> &'static str {
        match self {
            EvictPolicy::None => "none",
            EvictPolicy::All => "all",
            EvictPolicy::HalfLife => "half_life",
        }
    }

    fn evict(&self, nonces: &mut HashMap<String, Instant>, ttl: Duration, now: Instant) {
        match self {
            EvictPolicy::None => {}
            EvictPolicy::All => nonces.clear(),
            EvictPolicy::HalfLife => {
                // age = now - (expiry - ttl); keep entries with age <= ttl / 2
                let cutoff = now + ttl / 2;
                nonces.retain(|_, expiry| *expiry >= cutoff);
            }
        }
    }
}

impl fmt::Display for EvictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(now: Instant, ttl: Duration) -> HashMap<String, Instant> {
        let mut nonces = HashMap::new();
        // inserted 3h ago, 1h ago and just now with a 4h TTL
        nonces.insert("old".to_string(), now + ttl - Duration::from_secs(3 * 3600));
        nonces.insert("recent".to_string(), now + ttl - Duration::from_secs(3600));
        nonces.insert("new".to_string(), now + ttl);
        nonces
    }

    #[test]
    fn test_evict_none_keeps_everything() {
        let now = Instant::now();
        let ttl = Duration::from_secs(4 * 3600);
        let mut nonces = populate(now, ttl);
        EvictPolicy::None.evict(&mut nonces, ttl, now);
        assert_eq!(nonces.len(), 3);
    }

    #[test]
    fn test_evict_all_clears() {
        let now = Instant::now();
        let ttl = Duration::from_secs(4 * 3600);
        let mut nonces = populate(now, ttl);
        EvictPolicy::All.evict(&mut nonces, ttl, now);
        assert!(nonces.is_empty());
    }

    #[test]
    fn test_evict_half_life_drops_old_entries() {
        let now = Instant::now();
        let ttl = Duration::from_secs(4 * 3600);
        let mut nonces = populate(now, ttl);
        EvictPolicy::HalfLife.evict(&mut nonces, ttl, now);
        assert!(!nonces.contains_key("old"));
        assert!(nonces.contains_key("recent"));
        assert!(nonces.contains_key("new"));
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(EvictPolicy::default(), EvictPolicy::None);
        assert_eq!(EvictPolicy::HalfLife.to_string(), "half_life");
    }
}
