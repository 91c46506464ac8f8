//! Loading credentials from the environment, files and configuration.

use std::path::Path;

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::KeyConfig;
use crate::error::{HmacError, HmacResult, SecretErrorKind};

use super::{Credential, EncryptionKey};

/// Create a credential from an environment variable.
///
/// The variable is cleared after it has been read. Modifying the
/// environment is not thread-safe: call this, or anything that loads
/// `secret_env` keys, while the process is still single-threaded (before
/// the Tokio runtime is built).
pub fn credential_from_env(name: &str, encryption_key: &EncryptionKey) -> HmacResult<Credential> {
    let value = Zeroizing::new(std::env::var(name).map_err(|_| HmacError::Secret {
        kind: SecretErrorKind::EnvVarMissing {
            name: name.to_string(),
        },
    })?);
    std::env::remove_var(name);
    debug!(env_var = %name, "Loaded secret from environment");

    Credential::new(value.as_bytes(), encryption_key, false)
}

/// Create a credential from a secrets file.
///
/// Security: on Unix the file must not be accessible by group or others
/// (0600 or 0400). A single trailing newline is stripped.
pub fn credential_from_file(path: &Path, encryption_key: &EncryptionKey) -> HmacResult<Credential> {
    let metadata = std::fs::metadata(path).map_err(|e| source_error(format!(
        "Failed to read secret metadata from {}: {}",
        path.display(),
        e
    )))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        // Check that group and world bits are all zero (only owner can access)
        if mode & 0o077 != 0 {
            return Err(source_error(format!(
                "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                path.display(),
                mode & 0o777
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let mut content = Zeroizing::new(std::fs::read(path).map_err(|e| {
        source_error(format!("Failed to read secret from {}: {}", path.display(), e))
    })?);
    if content.last() == Some(&b'\n') {
        content.pop();
        if content.last() == Some(&b'\r') {
            content.pop();
        }
    }
    debug!(path = %path.display(), "Loaded secret from file");

    Credential::new(&content, encryption_key, false)
}

/// Create a credential from a `[[keys]]` configuration entry.
///
/// Exactly one of `secret`, `secret_env` or `secret_file` must be set;
/// `Settings::validate` enforces this at load time.
pub fn credential_from_config(
    config: &KeyConfig,
    encryption_key: &EncryptionKey,
) -> HmacResult<Credential> {
    match (&config.secret, &config.secret_env, &config.secret_file) {
        (Some(secret), None, None) => Credential::new(secret.as_bytes(), encryption_key, false),
        (None, Some(name), None) => credential_from_env(name, encryption_key),
        (None, None, Some(path)) => credential_from_file(path, encryption_key),
        _ => Err(HmacError::Config {
            message: format!(
                "Key '{}' must define exactly one of secret, secret_env, secret_file",
                config.key_id
            ),
        }),
    }
}

fn source_error(message: String) -> HmacError {
    HmacError::Secret {
        kind: SecretErrorKind::Source { message },
    }
}
