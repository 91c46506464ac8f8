//! HMAC-SHA256 signing and verification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use ring::hmac;
use subtle::ConstantTimeEq;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AuthErrorKind, HmacError, HmacResult, RejectReason};
use crate::nonce::{MemoryNonceStore, MemoryStoreConfig, NonceStore};
use crate::secret::{Credential, KeyProvider, KEY_ID_SEPARATOR};

use super::body::read_bounded;
use super::clock::{Clock, SystemClock};
use super::envelope::{format_envelope, Envelope, MAC_LEN};

/// Default allowed deviation of a timestamp into the past or the future.
pub const DEFAULT_KEY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default cap on body bytes read by sign and verify (32 MiB).
pub const MAX_INPUT_SIZE: usize = 32 * 1024 * 1024;

/// Separator between timestamp, nonce and body in the signed message.
const FIELD_SEPARATOR: &[u8] = b":";

/// Output of [`HmacProvider::sign256`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedSignature {
    /// Signature envelope (`hex` or `keyId.hex`).
    pub hash: String,
    /// RFC 3339 UTC signing time.
    pub timestamp: String,
    /// Nonce bound into the signature.
    pub nonce: String,
}

/// Signs and verifies payloads with shared secrets.
///
/// Two modes are offered: a stateless signature over the body alone, and a
/// timestamped signature over `timestamp ":" nonce ":" body` whose nonce is
/// consumed on first successful verification.
pub struct HmacProvider {
    key_provider: Arc<dyn KeyProvider>,
    nonce_store: Arc<dyn NonceStore>,
    interval: Duration,
    max_input_size: usize,
    clock: Arc<dyn Clock>,
}

/// Builder for [`HmacProvider`].
pub struct HmacProviderBuilder {
    key_provider: Arc<dyn KeyProvider>,
    nonce_store: Option<Arc<dyn NonceStore>>,
    interval: Duration,
    max_input_size: usize,
    clock: Arc<dyn Clock>,
}

impl HmacProviderBuilder {
    /// Use a specific nonce store instead of the default in-memory one.
    pub fn with_nonce_store(mut self, nonce_store: Arc<dyn NonceStore>) -> Self {
        self.nonce_store = Some(nonce_store);
        self
    }

    /// Set the freshness window for timestamped signatures.
    pub fn with_key_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum body size.
    pub fn with_max_input_size(mut self, max_input_size: usize) -> Self {
        self.max_input_size = max_input_size;
        self
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the provider.
    ///
    /// Without an explicit nonce store, an in-memory store with default
    /// settings is created; its cleanup task is started when a Tokio
    /// runtime is available.
    pub fn build(self) -> HmacProvider {
        let nonce_store = self.nonce_store.unwrap_or_else(|| {
            let config = MemoryStoreConfig::default();
            let store: Arc<dyn NonceStore> = if tokio::runtime::Handle::try_current().is_ok() {
                MemoryNonceStore::spawn(config)
            } else {
                Arc::new(MemoryNonceStore::new(config))
            };
            store
        });

        HmacProvider {
            key_provider: self.key_provider,
            nonce_store,
            interval: self.interval,
            max_input_size: self.max_input_size,
            clock: self.clock,
        }
    }
}

impl HmacProvider {
    /// Start building a provider around `key_provider`.
    pub fn builder(key_provider: Arc<dyn KeyProvider>) -> HmacProviderBuilder {
        HmacProviderBuilder {
            key_provider,
            nonce_store: None,
            interval: DEFAULT_KEY_INTERVAL,
            max_input_size: MAX_INPUT_SIZE,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a provider with default settings.
    pub fn new(key_provider: Arc<dyn KeyProvider>) -> Self {
        Self::builder(key_provider).build()
    }

    /// Freshness window for timestamped signatures.
    pub fn key_interval(&self) -> Duration {
        self.interval
    }

    /// Maximum body size.
    pub fn max_input_size(&self) -> usize {
        self.max_input_size
    }

    /// Sign `body` without timestamp or nonce.
    ///
    /// Returns `hex(mac)`, prefixed with `key_id.` when `key_id` is not
    /// empty.
    pub async fn sha256_sign<R>(&self, key_id: &str, mut body: R) -> HmacResult<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let secret = self.signing_secret(key_id).await?;
        let content = read_bounded(&mut body, self.max_input_size).await?;

        let tag = compute_mac(&secret, &[content.as_slice()])?;
        Ok(format_envelope(key_id, tag.as_ref()))
    }

    /// Verify a stateless signature.
    ///
    /// Returns the key id (empty when the envelope has none) on success.
    pub async fn sha256_verify<R>(&self, mut body: R, envelope: &str) -> HmacResult<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let parsed = Envelope::parse(envelope)?;
        let secret = self.verification_secret(parsed.key_id).await?;

        // Decode before touching the body
        let provided = parsed.decode_mac()?;
        let content = read_bounded(&mut body, self.max_input_size).await?;

        let expected = compute_mac(&secret, &[content.as_slice()])?;
        if !mac_matches(&expected, &provided) {
            info!(key_id = %parsed.key_id, "HMAC verification failed: signature mismatch");
            return Err(HmacError::invalid_request(RejectReason::SignatureMismatch));
        }

        debug!(key_id = %parsed.key_id, "HMAC signature verified");
        Ok(parsed.key_id.to_string())
    }

    /// Sign `body` with the current time and a fresh UUID nonce.
    pub async fn sign256<R>(&self, key_id: &str, body: R) -> HmacResult<TimestampedSignature>
    where
        R: AsyncRead + Unpin + Send,
    {
        let nonce = Uuid::new_v4().to_string();
        self.sign256_with_nonce(key_id, body, &nonce).await
    }

    /// Sign `body` with the current time and a caller-supplied nonce.
    ///
    /// The caller is responsible for never reusing `nonce`.
    pub async fn sign256_with_nonce<R>(
        &self,
        key_id: &str,
        mut body: R,
        nonce: &str,
    ) -> HmacResult<TimestampedSignature>
    where
        R: AsyncRead + Unpin + Send,
    {
        let secret = self.signing_secret(key_id).await?;
        let content = read_bounded(&mut body, self.max_input_size).await?;

        let timestamp = self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let tag = compute_mac(
            &secret,
            &[
                timestamp.as_bytes(),
                FIELD_SEPARATOR,
                nonce.as_bytes(),
                FIELD_SEPARATOR,
                content.as_slice(),
            ],
        )?;

        Ok(TimestampedSignature {
            hash: format_envelope(key_id, tag.as_ref()),
            timestamp,
            nonce: nonce.to_string(),
        })
    }

    /// Verify a timestamped signature and consume its nonce.
    ///
    /// Checks run cheapest first, and the nonce is only consumed once the
    /// timestamp is fresh and the MAC is authentic:
    /// 1. non-empty inputs
    /// 2. envelope shape and key lookup
    /// 3. timestamp within the freshness window
    /// 4. MAC decoding, bounded body read, constant-time comparison
    /// 5. nonce insert-if-absent
    pub async fn verify256<R>(
        &self,
        mut body: R,
        hash: &str,
        timestamp: &str,
        nonce: &str,
    ) -> HmacResult<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        if hash.is_empty() || timestamp.is_empty() || nonce.is_empty() {
            return Err(HmacError::invalid_request(RejectReason::MissingField));
        }

        let parsed = Envelope::parse(hash)?;
        let secret = self.verification_secret(parsed.key_id).await?;

        self.check_timestamp(timestamp).map_err(|reason| {
            warn!(
                key_id = %parsed.key_id,
                timestamp = %timestamp,
                reason = %reason,
                "HMAC timestamp rejected"
            );
            HmacError::invalid_request(reason)
        })?;

        let provided = parsed.decode_mac()?;
        let content = read_bounded(&mut body, self.max_input_size).await?;

        let expected = compute_mac(
            &secret,
            &[
                timestamp.as_bytes(),
                FIELD_SEPARATOR,
                nonce.as_bytes(),
                FIELD_SEPARATOR,
                content.as_slice(),
            ],
        )?;
        if !mac_matches(&expected, &provided) {
            info!(key_id = %parsed.key_id, "HMAC verification failed: signature mismatch");
            return Err(HmacError::invalid_request(RejectReason::SignatureMismatch));
        }

        if !self.nonce_store.add_if_not_exists(nonce).await {
            warn!(key_id = %parsed.key_id, "HMAC nonce rejected (replay or store failure)");
            return Err(HmacError::invalid_request(RejectReason::NonceRejected));
        }

        debug!(key_id = %parsed.key_id, "HMAC timestamped signature verified");
        Ok(parsed.key_id.to_string())
    }

    /// Check that `timestamp` lies strictly inside `now ± interval`.
    fn check_timestamp(&self, timestamp: &str) -> Result<(), RejectReason> {
        let ts = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| RejectReason::MalformedTimestamp)?
            .with_timezone(&Utc);
        let now = self.clock.now();

        let skew = match now.signed_duration_since(ts).to_std() {
            Ok(past) => past,
            // timestamp is in the future
            Err(_) => ts
                .signed_duration_since(now)
                .to_std()
                .map_err(|_| RejectReason::StaleTimestamp)?,
        };
        if skew < self.interval {
            Ok(())
        } else {
            Err(RejectReason::StaleTimestamp)
        }
    }

    async fn signing_secret(&self, key_id: &str) -> HmacResult<Arc<Credential>> {
        if key_id.contains(KEY_ID_SEPARATOR) {
            return Err(HmacError::auth(AuthErrorKind::InvalidKeyId));
        }
        self.verification_secret(key_id).await
    }

    async fn verification_secret(&self, key_id: &str) -> HmacResult<Arc<Credential>> {
        let secret = self
            .key_provider
            .fetch_secret(key_id)
            .await
            .map_err(|e| match e {
                HmacError::KeyLookup { .. } => e,
                other => HmacError::KeyLookup {
                    message: other.to_string(),
                },
            })?;

        match secret {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => {
                info!(key_id = %key_id, "Unknown HMAC key id");
                Err(HmacError::auth(AuthErrorKind::InvalidKeyId))
            }
        }
    }
}

/// HMAC-SHA256 over the concatenation of `parts`.
///
/// The decrypted key is dropped, and zeroed, as soon as the HMAC key
/// schedule has absorbed it.
fn compute_mac(secret: &Credential, parts: &[&[u8]]) -> HmacResult<hmac::Tag> {
    let key = {
        let key_bytes = secret.get_bytes()?;
        hmac::Key::new(hmac::HMAC_SHA256, &key_bytes)
    };

    let mut ctx = hmac::Context::with_key(&key);
    for part in parts {
        ctx.update(part);
    }
    Ok(ctx.sign())
}

fn mac_matches(expected: &hmac::Tag, provided: &[u8; MAC_LEN]) -> bool {
    bool::from(expected.as_ref().ct_eq(provided.as_slice()))
}
