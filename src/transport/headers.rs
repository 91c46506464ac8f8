//! Signature header names and extraction.

/// Header carrying the signature envelope.
pub const HEADER_HASH: &str = "X-HMAC-Hash";

/// Header carrying the RFC 3339 signing time.
pub const HEADER_TIMESTAMP: &str = "X-HMAC-Timestamp";

/// Header carrying the nonce.
pub const HEADER_NONCE: &str = "X-HMAC-Nonce";

/// The three signature headers of a request. Missing headers are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub hash: String,
    pub timestamp: String,
    pub nonce: String,
}

impl SignatureHeaders {
    /// Extract headers through a lookup function.
    ///
    /// The lookup receives the canonical header name; header maps that
    /// compare names case-insensitively can be passed directly.
    pub fn from_lookup<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let get = |name: &str| lookup(name).map(str::trim).unwrap_or_default().to_string();
        Self {
            hash: get(HEADER_HASH),
            timestamp: get(HEADER_TIMESTAMP),
            nonce: get(HEADER_NONCE),
        }
    }

    /// Extract headers from name/value pairs, matching names
    /// case-insensitively. The first occurrence of a header wins.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        Self::from_lookup(|name| {
            pairs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| *value)
        })
    }

    /// True when all three headers are present.
    pub fn is_complete(&self) -> bool {
        !self.hash.is_empty() && !self.timestamp.is_empty() && !self.nonce.is_empty()
    }

    /// Header name/value pairs for an outgoing request.
    pub fn to_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (HEADER_HASH, self.hash.as_str()),
            (HEADER_TIMESTAMP, self.timestamp.as_str()),
            (HEADER_NONCE, self.nonce.as_str()),
        ]
    }
}
