//! Error types for HMAC signing and verification.

use std::fmt;

use thiserror::Error;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum HmacError {
    /// Authentication errors. These are the opaque rejections.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// The key provider itself failed (storage, transport).
    #[error("Key lookup failed: {message}")]
    KeyLookup { message: String },

    /// In-memory secret handling errors.
    #[error("Secret error: {kind}")]
    Secret { kind: SecretErrorKind },

    /// Key-value backend errors.
    #[error("Key-value error: {kind}")]
    Kv { kind: KvErrorKind },

    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O errors while reading a body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    #[error("Invalid key id")]
    InvalidKeyId,

    #[error("Invalid hash format")]
    InvalidHashFormat,

    #[error("Input too large: exceeds maximum of {max} bytes")]
    InputTooLarge { max: usize },

    #[error("Invalid request ({reason})")]
    InvalidRequest { reason: RejectReason },
}

/// Why a request was classified as invalid.
///
/// Only used for diagnostics; callers should not expose it to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Signature, timestamp or nonce was empty.
    MissingField,
    /// Timestamp is not RFC 3339.
    MalformedTimestamp,
    /// Timestamp outside the freshness window.
    StaleTimestamp,
    /// Recomputed MAC differs from the provided one.
    SignatureMismatch,
    /// Nonce store refused the nonce (replay, capacity or backend failure).
    NonceRejected,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::MissingField => "missing field",
            RejectReason::MalformedTimestamp => "malformed timestamp",
            RejectReason::StaleTimestamp => "stale timestamp",
            RejectReason::SignatureMismatch => "signature mismatch",
            RejectReason::NonceRejected => "nonce rejected",
        };
        f.write_str(s)
    }
}

/// Secret handling error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretErrorKind {
    #[error("Empty credential")]
    EmptyCredential,

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed")]
    Decryption,

    #[error("Random generator failure")]
    Random,

    #[error("Environment variable '{name}' is not set")]
    EnvVarMissing { name: String },

    #[error("Failed to read secret: {message}")]
    Source { message: String },
}

/// Key-value backend error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvErrorKind {
    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Operation timed out after {millis} ms")]
    Timeout { millis: u64 },
}

impl HmacError {
    /// Shorthand for an authentication error.
    pub fn auth(kind: AuthErrorKind) -> Self {
        HmacError::Auth { kind }
    }

    /// Shorthand for an invalid request with a diagnostic reason.
    pub fn invalid_request(reason: RejectReason) -> Self {
        HmacError::Auth {
            kind: AuthErrorKind::InvalidRequest { reason },
        }
    }

    /// True for failures that must collapse into one opaque rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(self, HmacError::Auth { .. })
    }

    /// HTTP status a transport binding should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            HmacError::Auth { .. } => 401,
            HmacError::Config { .. } => 500,
            HmacError::KeyLookup { .. }
            | HmacError::Secret { .. }
            | HmacError::Kv { .. }
            | HmacError::Io(_) => 503,
        }
    }
}

/// Result type alias for crate operations.
pub type HmacResult<T> = Result<T, HmacError>;
