//! HMAC authentication.
//!
//! Handles signature envelopes, bounded body reads, timestamp freshness,
//! and the signing/verification provider itself.

mod body;
mod clock;
mod envelope;
mod hmac;

pub use body::read_bounded;
pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{format_envelope, Envelope, MAC_LEN};
pub use hmac::{
    HmacProvider, HmacProviderBuilder, TimestampedSignature, DEFAULT_KEY_INTERVAL, MAX_INPUT_SIZE,
};
