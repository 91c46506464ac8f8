//! Request guard: authenticate a request from its headers and body.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{debug, error, warn};

use crate::auth::{read_bounded, HmacProvider};
use crate::error::{HmacError, HmacResult};

use super::headers::SignatureHeaders;

/// Identity attached to a request that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    /// Key id from the envelope (empty for anonymous-key signatures).
    pub key_id: String,
    pub timestamp: String,
    pub nonce: String,
    /// The verified body, for handlers further down the chain.
    pub body: Vec<u8>,
}

/// Opaque rejection. Carries only the status to return to the client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Request rejected (status {status})")]
pub struct Rejection {
    status: u16,
}

impl Rejection {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for authentication failures, false for backend failures.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Verifies timestamped signatures on incoming requests.
#[derive(Clone)]
pub struct HmacGuard {
    provider: Arc<HmacProvider>,
}

impl HmacGuard {
    pub fn new(provider: Arc<HmacProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<HmacProvider> {
        &self.provider
    }

    /// Authenticate a request.
    ///
    /// The body is only read when all signature headers are present, and
    /// never past the provider's input limit. On success the bytes that
    /// were verified are handed back in [`Authenticated::body`]. The
    /// specific failure is logged; the caller receives a status code only.
    pub async fn authorize<R>(
        &self,
        headers: &SignatureHeaders,
        mut body: R,
    ) -> Result<Authenticated, Rejection>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !headers.is_complete() {
            warn!("HMAC authentication failed: missing headers");
            return Err(Rejection { status: 401 });
        }

        let content = read_bounded(&mut body, self.provider.max_input_size())
            .await
            .map_err(|e| reject(e, headers))?;

        let key_id = self
            .provider
            .verify256(
                content.as_slice(),
                &headers.hash,
                &headers.timestamp,
                &headers.nonce,
            )
            .await
            .map_err(|e| reject(e, headers))?;

        debug!(key_id = %key_id, "HMAC authentication successful");
        Ok(Authenticated {
            key_id,
            timestamp: headers.timestamp.clone(),
            nonce: headers.nonce.clone(),
            body: content,
        })
    }
}

fn reject(e: HmacError, headers: &SignatureHeaders) -> Rejection {
    if e.is_rejection() {
        warn!(error = %e, timestamp = %headers.timestamp, "HMAC verification failed");
    } else {
        error!(error = %e, "HMAC verification could not complete");
    }
    Rejection {
        status: e.status_code(),
    }
}

/// Sign an outgoing request body, returning the headers to attach.
pub async fn sign_request<R>(
    provider: &HmacProvider,
    key_id: &str,
    body: R,
) -> HmacResult<SignatureHeaders>
where
    R: AsyncRead + Unpin + Send,
{
    let signed = provider.sign256(key_id, body).await?;
    Ok(SignatureHeaders {
        hash: signed.hash,
        timestamp: signed.timestamp,
        nonce: signed.nonce,
    })
}
