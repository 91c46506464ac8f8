//! Binding between the authenticator and a request/response transport.
//!
//! A request carries its signature in three headers; the body is the signed
//! payload. Handlers only ever see an opaque rejection status.

mod guard;
mod headers;

pub use guard::{sign_request, Authenticated, HmacGuard, Rejection};
pub use headers::{SignatureHeaders, HEADER_HASH, HEADER_NONCE, HEADER_TIMESTAMP};
