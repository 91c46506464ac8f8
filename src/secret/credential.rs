//! Secrets kept encrypted in process memory.
//!
//! A [`Credential`] holds its material sealed with AES-256-GCM under a
//! process-local [`EncryptionKey`]. Plaintext only exists inside the
//! [`Zeroizing`] buffer returned by [`Credential::get_bytes`], which is wiped
//! when dropped.

use std::fmt;
use std::sync::RwLock;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{HmacError, HmacResult, SecretErrorKind};

/// Length of the in-memory encryption key.
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Process-local key used to seal credentials in memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_LEN]);

impl EncryptionKey {
    /// Generate a random key from the system CSPRNG.
    pub fn generate() -> HmacResult<Self> {
        let mut bytes = [0u8; ENCRYPTION_KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| secret_error(SecretErrorKind::Random))?;
        Ok(Self(bytes))
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; ENCRYPTION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    fn sealing_key(&self) -> HmacResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| secret_error(SecretErrorKind::Encryption))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(***)")
    }
}

struct Sealed {
    key: Option<LessSafeKey>,
    ciphertext: Zeroizing<Vec<u8>>,
    nonce: [u8; NONCE_LEN],
    empty: bool,
}

/// A shared secret stored encrypted in memory.
pub struct Credential {
    state: RwLock<Sealed>,
    rng: SystemRandom,
}

impl Credential {
    /// Seal `data` under `encryption_key`.
    ///
    /// Empty data is refused unless `allow_empty` is set.
    pub fn new(data: &[u8], encryption_key: &EncryptionKey, allow_empty: bool) -> HmacResult<Self> {
        if data.is_empty() && !allow_empty {
            return Err(secret_error(SecretErrorKind::EmptyCredential));
        }

        let credential = Self {
            state: RwLock::new(Sealed {
                key: Some(encryption_key.sealing_key()?),
                ciphertext: Zeroizing::new(Vec::new()),
                nonce: [0u8; NONCE_LEN],
                empty: true,
            }),
            rng: SystemRandom::new(),
        };
        if !data.is_empty() {
            credential.update_bytes(data)?;
        }
        Ok(credential)
    }

    /// Seal `data` under a freshly generated key.
    pub fn with_random_key(data: &[u8]) -> HmacResult<Self> {
        let key = EncryptionKey::generate()?;
        Self::new(data, &key, false)
    }

    /// Create a credential holding `len` random bytes.
    pub fn random(len: usize) -> HmacResult<Self> {
        let mut secret = Zeroizing::new(vec![0u8; len]);
        SystemRandom::new()
            .fill(&mut secret[..])
            .map_err(|_| secret_error(SecretErrorKind::Random))?;
        Self::with_random_key(&secret)
    }

    /// Decrypt the secret.
    ///
    /// The returned buffer is zeroed on drop; keep it only as long as the
    /// operation that needs it.
    pub fn get_bytes(&self) -> HmacResult<Zeroizing<Vec<u8>>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.empty {
            return Ok(Zeroizing::new(Vec::new()));
        }
        let key = state
            .key
            .as_ref()
            .ok_or_else(|| secret_error(SecretErrorKind::EmptyCredential))?;

        let mut buf = Zeroizing::new(state.ciphertext.to_vec());
        let plain_len = key
            .open_in_place(
                Nonce::assume_unique_for_key(state.nonce),
                Aad::empty(),
                &mut buf[..],
            )
            .map_err(|_| secret_error(SecretErrorKind::Decryption))?
            .len();
        buf.truncate(plain_len);
        Ok(buf)
    }

    /// Replace the secret with new material. Empty data clears it.
    pub fn update_bytes(&self, data: &[u8]) -> HmacResult<()> {
        if data.is_empty() {
            self.clear();
            return Ok(());
        }

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| secret_error(SecretErrorKind::Random))?;

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let key = state
            .key
            .as_ref()
            .ok_or_else(|| secret_error(SecretErrorKind::EmptyCredential))?;

        let mut in_out = Zeroizing::new(data.to_vec());
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::empty(),
            &mut *in_out,
        )
        .map_err(|_| secret_error(SecretErrorKind::Encryption))?;

        state.ciphertext = in_out;
        state.nonce = nonce;
        state.empty = false;
        Ok(())
    }

    /// Zero out all sealed material and drop the sealing key.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.ciphertext.zeroize();
        state.nonce.zeroize();
        state.key = None;
        state.empty = true;
    }

    /// True if the credential holds no material.
    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).empty
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

fn secret_error(kind: SecretErrorKind) -> HmacError {
    HmacError::Secret { kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cred = Credential::with_random_key(b"super-secret").unwrap();
        assert!(!cred.is_empty());
        assert_eq!(cred.get_bytes().unwrap().as_slice(), b"super-secret");
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let cred = Credential::with_random_key(b"super-secret").unwrap();
        let state = cred.state.read().unwrap();
        assert!(!state
            .ciphertext
            .windows(b"super-secret".len())
            .any(|w| w == b"super-secret"));
    }

    #[test]
    fn test_empty_rejected_unless_allowed() {
        let key = EncryptionKey::generate().unwrap();
        let err = Credential::new(b"", &key, false).unwrap_err();
        assert!(matches!(
            err,
            HmacError::Secret {
                kind: SecretErrorKind::EmptyCredential
            }
        ));

        let cred = Credential::new(b"", &key, true).unwrap();
        assert!(cred.is_empty());
        assert!(cred.get_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_update_and_clear() {
        let key = EncryptionKey::generate().unwrap();
        let cred = Credential::new(b"first", &key, false).unwrap();

        cred.update_bytes(b"second").unwrap();
        assert_eq!(cred.get_bytes().unwrap().as_slice(), b"second");

        cred.clear();
        assert!(cred.is_empty());
        assert!(cred.update_bytes(b"third").is_err());
    }

    #[test]
    fn test_random_credential_length() {
        let cred = Credential::random(32).unwrap();
        assert_eq!(cred.get_bytes().unwrap().len(), 32);
    }

    #[test]
    fn test_debug_hides_material() {
        let cred = Credential::with_random_key(b"super-secret").unwrap();
        let printed = format!("{:?}", cred);
        assert!(!printed.contains("super-secret"));
        assert_eq!(format!("{:?}", EncryptionKey::from_bytes([7; 32])), "EncryptionKey(***)");
    }
}
