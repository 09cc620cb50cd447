//! Request parameter serialization and HMAC-SHA256 signing.
//!
//! The signed byte string and the transmitted byte string must be
//! identical: parameters serialize in insertion order, values are
//! percent-encoded exactly once, and the signature is appended as the
//! final parameter after signing.

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature, hex-encoded.
pub fn sign_hmac_sha256_hex(payload: impl AsRef<[u8]>, secret: &str) -> String {
    // Key length is unconstrained for HMAC; new_from_slice cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(payload.as_ref());
    hex::encode(mac.finalize().into_bytes())
}

/// Percent-encode a parameter value for the wire.
pub fn percent_encode(source: &str) -> String {
    const FRAGMENT: &AsciiSet = &CONTROLS.add(b'+').add(b',').add(b'=').add(b'&');
    utf8_percent_encode(source, FRAGMENT).to_string()
}

/// Insertion-ordered request parameters.
///
/// Order is load-bearing: the venue verifies the signature against the
/// exact transmitted string, so parameters are never sorted or
/// re-serialized after signing.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter. Values are stringified with `ToString`.
    pub fn push(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a parameter when the value is present.
    pub fn push_opt(&mut self, key: &str, value: Option<impl ToString>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Serialize as `key=value&key=value` in insertion order.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(&percent_encode(value));
        }
        out
    }

    /// Serialize and append `signature=<hex>` computed over the
    /// serialized form. The returned string is transmitted verbatim.
    pub fn signed_query(&self, secret: &str) -> String {
        let query = self.serialize();
        let signature = sign_hmac_sha256_hex(query.as_bytes(), secret);
        if query.is_empty() {
            format!("signature={signature}")
        } else {
            format!("{query}&signature={signature}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vector from the venue's signature documentation.
    const DOC_QUERY: &[u8] = b"symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    #[test]
    fn test_hmac_sha256_reference_vector() {
        assert_eq!(
            sign_hmac_sha256_hex(DOC_QUERY, DOC_SECRET),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_params_preserve_insertion_order() {
        let mut params = Params::new();
        params
            .push("symbol", "LTCBTC")
            .push("side", "BUY")
            .push("type", "LIMIT")
            .push("timeInForce", "GTC")
            .push("quantity", 1)
            .push("price", "0.1")
            .push("recvWindow", 5000)
            .push("timestamp", 1499827319559u64);
        assert_eq!(params.serialize().as_bytes(), DOC_QUERY);
    }

    #[test]
    fn test_signed_query_appends_signature_last() {
        let mut params = Params::new();
        params.push("symbol", "BTCUSDT").push("timestamp", 1);
        let query = params.signed_query("secret");
        let serialized = params.serialize();
        assert!(query.starts_with(&serialized));
        let suffix = &query[serialized.len()..];
        assert!(suffix.starts_with("&signature="));
        // Signed bytes equal transmitted bytes before the signature.
        let expected = sign_hmac_sha256_hex(serialized.as_bytes(), "secret");
        assert_eq!(suffix, format!("&signature={expected}"));
    }

    #[test]
    fn test_push_opt_skips_none() {
        let mut params = Params::new();
        params
            .push("a", 1)
            .push_opt("b", None::<u32>)
            .push_opt("c", Some(3));
        assert_eq!(params.serialize(), "a=1&c=3");
    }
}
