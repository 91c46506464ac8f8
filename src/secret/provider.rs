//! Key providers: map a key id to its credential.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{HmacError, HmacResult};

use super::Credential;

/// Separator between key id and MAC in a signature envelope.
pub const KEY_ID_SEPARATOR: char = '.';

/// Resolves key ids to secrets.
///
/// `Ok(None)` means the key is unknown. `Err` is reserved for failures of
/// the backing store itself and is reported as a lookup failure, not as an
/// invalid signature. An empty `key_id` is a valid lookup for single-key
/// deployments.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn fetch_secret(&self, key_id: &str) -> HmacResult<Option<Arc<Credential>>>;
}

/// Provider serving exactly one key.
#[derive(Debug)]
pub struct SingleKeyProvider {
    key_id: String,
    secret: Arc<Credential>,
}

impl SingleKeyProvider {
    /// Create a provider for `key_id`, which may be empty.
    pub fn new(key_id: impl Into<String>, secret: Credential) -> HmacResult<Self> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self {
            key_id,
            secret: Arc::new(secret),
        })
    }
}

#[async_trait]
impl KeyProvider for SingleKeyProvider {
    async fn fetch_secret(&self, key_id: &str) -> HmacResult<Option<Arc<Credential>>> {
        if key_id == self.key_id {
            return Ok(Some(Arc::clone(&self.secret)));
        }
        Ok(None)
    }
}

/// Provider holding any number of keys, e.g. one per client.
#[derive(Debug, Default)]
pub struct MultiKeyProvider {
    keys: RwLock<HashMap<String, Arc<Credential>>>,
}

impl MultiKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a key.
    pub fn insert(&self, key_id: impl Into<String>, secret: Credential) -> HmacResult<()> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_id, Arc::new(secret));
        Ok(())
    }

    /// Remove a key. Returns true if it was present.
    pub fn remove(&self, key_id: &str) -> bool {
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyProvider for MultiKeyProvider {
    async fn fetch_secret(&self, key_id: &str) -> HmacResult<Option<Arc<Credential>>> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        Ok(keys.get(key_id).cloned())
    }
}

#[async_trait]
impl<T: KeyProvider + ?Sized> KeyProvider for Arc<T> {
    async fn fetch_secret(&self, key_id: &str) -> HmacResult<Option<Arc<Credential>>> {
        (**self).fetch_secret(key_id).await
    }
}

/// Key ids must be printable and must not contain the envelope separator.
pub fn validate_key_id(key_id: &str) -> HmacResult<()> {
    if key_id.contains(KEY_ID_SEPARATOR) {
        return Err(HmacError::Config {
            message: format!("Key id '{}' must not contain '{}'", key_id, KEY_ID_SEPARATOR),
        });
    }
    if key_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(HmacError::Config {
            message: format!("Key id {:?} contains non-printable characters", key_id),
        });
    }
    Ok(())
}
