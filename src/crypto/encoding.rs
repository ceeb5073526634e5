/// Encoding utilities: base64url, SHA-256, ACE domain encoding
use crate::error::{AcmeError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Encode with URL-safe base64, no padding (RFC 7515 shape)
pub fn base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode URL-safe base64, with or without padding
pub fn base64url_decode(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| AcmeError::crypto(format!("base64url decode error: {e}")))
}

/// Whether the string is non-empty and uses only the base64url alphabet.
/// Nonces that fail this check are rejected (RFC 8555 section 6.5.1).
pub fn is_base64url(data: &str) -> bool {
    !data.is_empty()
        && data
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// ACE-encode a domain name (UTS-46 / Punycode).
///
/// Case-folds, maps the alternative dot separators (U+3002, U+FF0E,
/// U+FF61) to `.`, and leaves already-encoded labels untouched, so the
/// operation is idempotent.
pub fn to_ace(domain: &str) -> Result<String> {
    idna::domain_to_ascii(domain)
        .map_err(|e| AcmeError::invalid_input(format!("invalid domain name {domain:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64url_digest_vector() {
        // sha256("foobar") = c3ab8ff1...c4f2
        let digest = sha256(b"foobar");
        assert_eq!(
            hex::encode(digest),
            "c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2"
        );
        assert_eq!(
            base64url(&digest),
            "w6uP8Tcg6K2QR905Rms8iXTlksL6OD1KOWBxTK7wxPI"
        );
    }

    #[test]
    fn base64url_decode_tolerates_padding() {
        assert_eq!(base64url_decode("Zm9v").unwrap(), b"foo");
        assert_eq!(base64url_decode("Zm9vYg==").unwrap(), b"foob");
    }

    #[test]
    fn base64url_charset_check() {
        assert!(is_base64url("oFvnlFP1wIhRlYS2jTaXbA"));
        assert!(is_base64url("abc-_09"));
        assert!(!is_base64url(""));
        assert!(!is_base64url("not+base64url"));
        assert!(!is_base64url("white space"));
    }

    #[test]
    fn ace_encodes_unicode_domains() {
        assert_eq!(to_ace("ExÄmþle.¢öM").unwrap(), "xn--exmle-hra7p.xn--m-7ba6w");
        assert_eq!(to_ace("example.com").unwrap(), "example.com");
    }

    #[test]
    fn ace_maps_alternative_separators() {
        assert_eq!(to_ace("example\u{3002}com").unwrap(), "example.com");
        assert_eq!(to_ace("example\u{ff0e}com").unwrap(), "example.com");
        assert_eq!(to_ace("example\u{ff61}com").unwrap(), "example.com");
    }

    #[test]
    fn ace_is_idempotent() {
        let once = to_ace("ExÄmþle.¢öM").unwrap();
        assert_eq!(to_ace(&once).unwrap(), once);
    }
}
