/// Account key pairs and MAC keys for JWS signing.
///
/// Asymmetric keys are loaded from PKCS#8; the JWS algorithm is selected
/// from the key shape (RSA → RS256, P-256/P-384/P-521 → ES256/ES384/ES512).
/// MAC keys select HS256/HS384/HS512 by key length.
use crate::crypto::encoding::{base64url, sha256};
use crate::error::{AcmeError, Result};
use hmac::{Hmac, Mac};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use sha2::{Sha256, Sha384, Sha512};
use signature::Signer;

/// JWS signature algorithm (RFC 7518)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
    /// ECDSA P-256 with SHA-256
    Es256,
    /// ECDSA P-384 with SHA-384
    Es384,
    /// ECDSA P-521 with SHA-512
    Es512,
    /// HMAC with SHA-256
    Hs256,
    /// HMAC with SHA-384
    Hs384,
    /// HMAC with SHA-512
    Hs512,
}

impl JwsAlgorithm {
    /// The RFC 7518 algorithm name
    pub fn as_str(self) -> &'static str {
        match self {
            JwsAlgorithm::Rs256 => "RS256",
            JwsAlgorithm::Es256 => "ES256",
            JwsAlgorithm::Es384 => "ES384",
            JwsAlgorithm::Es512 => "ES512",
            JwsAlgorithm::Hs256 => "HS256",
            JwsAlgorithm::Hs384 => "HS384",
            JwsAlgorithm::Hs512 => "HS512",
        }
    }
}

impl std::fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

enum KeyInner {
    Rsa(Box<rsa::RsaPrivateKey>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

/// An asymmetric account key pair
pub struct AccountKey {
    inner: KeyInner,
    pkcs8: Vec<u8>,
}

impl AccountKey {
    /// Load a key from PKCS#8 DER. Any shape other than RSA or the NIST
    /// P-curves fails with `UnsupportedKey`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            KeyInner::P256(key)
        } else if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
            KeyInner::P384(key)
        } else if let Ok(key) = p521::ecdsa::SigningKey::from_pkcs8_der(der) {
            KeyInner::P521(key)
        } else if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
            KeyInner::Rsa(Box::new(key))
        } else {
            return Err(AcmeError::unsupported_key(
                "not an RSA or NIST P-curve PKCS#8 private key",
            ));
        };
        Ok(Self { inner, pkcs8: der.to_vec() })
    }

    /// Load a key from a PKCS#8 PEM document (`PRIVATE KEY` block)
    pub fn from_pkcs8_pem(pem_data: &str) -> Result<Self> {
        let block = pem::parse(pem_data)
            .map_err(|e| AcmeError::crypto(format!("PEM parse error: {e}")))?;
        if block.tag() != "PRIVATE KEY" {
            return Err(AcmeError::unsupported_key(format!(
                "expected a PRIVATE KEY block, got {}",
                block.tag()
            )));
        }
        Self::from_pkcs8_der(block.contents())
    }

    /// Generate a fresh P-256 key pair
    pub fn generate_p256() -> Result<Self> {
        let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let pkcs8 = key
            .to_pkcs8_der()
            .map_err(|e| AcmeError::crypto(format!("PKCS#8 encode error: {e}")))?;
        Ok(Self {
            inner: KeyInner::P256(key),
            pkcs8: pkcs8.as_bytes().to_vec(),
        })
    }

    /// The JWS algorithm this key signs with
    pub fn algorithm(&self) -> JwsAlgorithm {
        match &self.inner {
            KeyInner::Rsa(_) => JwsAlgorithm::Rs256,
            KeyInner::P256(_) => JwsAlgorithm::Es256,
            KeyInner::P384(_) => JwsAlgorithm::Es384,
            KeyInner::P521(_) => JwsAlgorithm::Es512,
        }
    }

    /// The public key as a JWK object for embedding in a JWS header
    pub fn public_jwk(&self) -> Value {
        match &self.inner {
            KeyInner::Rsa(key) => json!({
                "kty": "RSA",
                "n": base64url(&key.n().to_bytes_be()),
                "e": base64url(&key.e().to_bytes_be()),
            }),
            KeyInner::P256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                ec_jwk("P-256", point.x(), point.y())
            }
            KeyInner::P384(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                ec_jwk("P-384", point.x(), point.y())
            }
            KeyInner::P521(key) => {
                let point = p521::ecdsa::VerifyingKey::from(key).to_encoded_point(false);
                ec_jwk("P-521", point.x(), point.y())
            }
        }
    }

    /// The canonical JWK serialization of the public key: required members
    /// only, lexicographic order, no whitespace (RFC 7638)
    fn canonical_jwk(&self) -> String {
        let jwk = self.public_jwk();
        let field = |name: &str| jwk[name].as_str().unwrap_or_default().to_owned();
        match &self.inner {
            KeyInner::Rsa(_) => format!(
                r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
                field("e"),
                field("n")
            ),
            _ => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                field("crv"),
                field("x"),
                field("y")
            ),
        }
    }

    /// The RFC 7638 key thumbprint: base64url(SHA-256(canonical JWK))
    pub fn thumbprint(&self) -> String {
        base64url(&sha256(self.canonical_jwk().as_bytes()))
    }

    /// Sign a message, producing the raw JWS signature bytes
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let map_err = |e: signature::Error| AcmeError::crypto(format!("signing failed: {e}"));
        match &self.inner {
            KeyInner::Rsa(key) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new((**key).clone());
                let signature: rsa::pkcs1v15::Signature =
                    signer.try_sign(message).map_err(map_err)?;
                Ok(signature::SignatureEncoding::to_vec(&signature))
            }
            KeyInner::P256(key) => {
                let signature: p256::ecdsa::Signature = key.try_sign(message).map_err(map_err)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyInner::P384(key) => {
                let signature: p384::ecdsa::Signature = key.try_sign(message).map_err(map_err)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyInner::P521(key) => {
                let signature: p521::ecdsa::Signature = key.try_sign(message).map_err(map_err)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    /// The PKCS#8 DER of the private key. Used for the key-rollover
    /// no-op guard; never sent anywhere.
    pub(crate) fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }
}

fn ec_jwk(curve: &str, x: Option<&impl AsRef<[u8]>>, y: Option<&impl AsRef<[u8]>>) -> Value {
    json!({
        "kty": "EC",
        "crv": curve,
        "x": base64url(x.map(AsRef::as_ref).unwrap_or_default()),
        "y": base64url(y.map(AsRef::as_ref).unwrap_or_default()),
    })
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// A symmetric MAC key, used for External Account Binding
pub struct MacKey {
    key: Vec<u8>,
    algorithm: JwsAlgorithm,
}

impl MacKey {
    /// Create a MAC key. The algorithm is selected by key length:
    /// 32 bytes → HS256, 48 → HS384, 64 → HS512; anything else fails.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        let algorithm = match key.len() {
            32 => JwsAlgorithm::Hs256,
            48 => JwsAlgorithm::Hs384,
            64 => JwsAlgorithm::Hs512,
            other => {
                return Err(AcmeError::unsupported_key(format!(
                    "MAC key of {other} bytes; expected 32, 48 or 64"
                )));
            }
        };
        Ok(Self { key, algorithm })
    }

    /// Create a MAC key from its base64url encoding, as CAs hand them out
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::new(crate::crypto::encoding::base64url_decode(encoded)?)
    }

    /// The HMAC algorithm this key signs with
    pub fn algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    /// Compute the MAC over a message
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        macro_rules! mac {
            ($digest:ty) => {{
                let mut mac = Hmac::<$digest>::new_from_slice(&self.key)
                    .map_err(|e| AcmeError::crypto(format!("HMAC key error: {e}")))?;
                mac.update(message);
                Ok(mac.finalize().into_bytes().to_vec())
            }};
        }
        match self.algorithm {
            JwsAlgorithm::Hs256 => mac!(Sha256),
            JwsAlgorithm::Hs384 => mac!(Sha384),
            JwsAlgorithm::Hs512 => mac!(Sha512),
            _ => unreachable!("MacKey only holds HMAC algorithms"),
        }
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p256_selects_es256() {
        let key = AccountKey::generate_p256().unwrap();
        assert_eq!(key.algorithm(), JwsAlgorithm::Es256);
        // stable across calls
        assert_eq!(key.algorithm(), JwsAlgorithm::Es256);
    }

    #[test]
    fn p256_round_trips_through_pkcs8() {
        let key = AccountKey::generate_p256().unwrap();
        let restored = AccountKey::from_pkcs8_der(key.pkcs8_der()).unwrap();
        assert_eq!(restored.algorithm(), JwsAlgorithm::Es256);
        assert_eq!(restored.thumbprint(), key.thumbprint());
    }

    #[test]
    fn rejects_unknown_key_material() {
        assert!(matches!(
            AccountKey::from_pkcs8_der(b"not a key"),
            Err(AcmeError::UnsupportedKey(_))
        ));
    }

    #[test]
    fn thumbprint_is_stable() {
        let key = AccountKey::generate_p256().unwrap();
        assert_eq!(key.thumbprint(), key.thumbprint());
    }

    #[test]
    fn rsa_canonical_jwk_matches_rfc7638_vector() {
        // The example key of RFC 7638 section 3.1
        let n = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";
        let canonical = format!(r#"{{"e":"AQAB","kty":"RSA","n":"{n}"}}"#);
        assert_eq!(
            base64url(&sha256(canonical.as_bytes())),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn es256_signature_verifies() {
        use p256::ecdsa::signature::Verifier;

        let key = AccountKey::generate_p256().unwrap();
        let signature = key.sign(b"signing input").unwrap();
        assert_eq!(signature.len(), 64);

        let KeyInner::P256(inner) = &key.inner else {
            panic!("generated key is P-256");
        };
        let signature = p256::ecdsa::Signature::from_slice(&signature).unwrap();
        inner
            .verifying_key()
            .verify(b"signing input", &signature)
            .unwrap();
    }

    #[test]
    fn mac_key_algorithm_by_length() {
        assert_eq!(MacKey::new(vec![0; 32]).unwrap().algorithm(), JwsAlgorithm::Hs256);
        assert_eq!(MacKey::new(vec![0; 48]).unwrap().algorithm(), JwsAlgorithm::Hs384);
        assert_eq!(MacKey::new(vec![0; 64]).unwrap().algorithm(), JwsAlgorithm::Hs512);
        assert!(MacKey::new(vec![0; 33]).is_err());
        assert!(MacKey::new(Vec::new()).is_err());
    }
}
