//! Signature envelope: `hex(mac)` or `keyId "." hex(mac)`.

use crate::error::{AuthErrorKind, HmacError, HmacResult};
use crate::secret::KEY_ID_SEPARATOR;

/// Length of an HMAC-SHA256 tag in bytes.
pub const MAC_LEN: usize = 32;

/// A parsed signature envelope borrowing from the input string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Key id, empty when the envelope carries none.
    pub key_id: &'a str,
    /// Hex-encoded MAC.
    pub mac_hex: &'a str,
}

impl<'a> Envelope<'a> {
    /// Split an envelope on its separator.
    ///
    /// More than one separator, or an empty key id in front of one, is
    /// rejected as an invalid hash format.
    pub fn parse(envelope: &'a str) -> HmacResult<Self> {
        let mut parts = envelope.split(KEY_ID_SEPARATOR);
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(invalid_format());
        }

        match second {
            None => Ok(Self {
                key_id: "",
                mac_hex: first,
            }),
            Some(_) if first.is_empty() => Err(invalid_format()),
            Some(mac_hex) => Ok(Self {
                key_id: first,
                mac_hex,
            }),
        }
    }

    /// Decode the MAC into a fixed-size tag.
    pub fn decode_mac(&self) -> HmacResult<[u8; MAC_LEN]> {
        let mut mac = [0u8; MAC_LEN];
        hex::decode_to_slice(self.mac_hex, &mut mac).map_err(|_| invalid_format())?;
        Ok(mac)
    }
}

/// Format an envelope, prefixing the key id when there is one.
pub fn format_envelope(key_id: &str, mac: &[u8]) -> String {
    let mac_hex = hex::encode(mac);
    if key_id.is_empty() {
        mac_hex
    } else {
        format!("{}{}{}", key_id, KEY_ID_SEPARATOR, mac_hex)
    }
}

fn invalid_format() -> HmacError {
    HmacError::auth(AuthErrorKind::InvalidHashFormat)
}
