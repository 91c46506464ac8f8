//! Secret storage.
//!
//! Credentials are kept encrypted in memory and resolved by key id through
//! a [`KeyProvider`].

mod credential;
mod provider;
mod source;

pub use credential::{Credential, EncryptionKey, ENCRYPTION_KEY_LEN};
pub use provider::{
    validate_key_id, KeyProvider, MultiKeyProvider, SingleKeyProvider, KEY_ID_SEPARATOR,
};
pub use source::{credential_from_config, credential_from_env, credential_from_file};
