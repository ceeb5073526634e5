/// Flattened JWS construction for ACME requests (RFC 8555 section 6.2)
use crate::crypto::encoding::base64url;
use crate::crypto::keys::{AccountKey, MacKey};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

/// A flattened JWS, the body of every signed ACME request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jws {
    /// base64url of the protected header JSON
    pub protected: String,
    /// base64url of the payload; the empty string for POST-as-GET
    pub payload: String,
    /// base64url of the signature
    pub signature: String,
}

/// How the signing key is identified in the protected header.
/// Exactly one of `kid` and `jwk` appears per JWS.
#[derive(Debug, Clone, Copy)]
pub enum KeyBinding<'a> {
    /// `kid`: the account URL, for all requests after account creation
    KeyId(&'a str),
    /// Inline public JWK, for `newAccount`, key-change and
    /// domain-key-authenticated revocation
    EmbeddedJwk,
}

/// Sign an ACME request.
///
/// `payload` of `None` produces a POST-as-GET (empty-string payload,
/// distinct from JSON `null`). `nonce` is omitted only for inner JWSes.
pub fn sign_request(
    url: &Url,
    key: &AccountKey,
    binding: KeyBinding<'_>,
    nonce: Option<&str>,
    payload: Option<&Value>,
) -> Result<Jws> {
    let mut header = serde_json::Map::new();
    header.insert("alg".into(), json!(key.algorithm().as_str()));
    match binding {
        KeyBinding::KeyId(kid) => header.insert("kid".into(), json!(kid)),
        KeyBinding::EmbeddedJwk => header.insert("jwk".into(), key.public_jwk()),
    };
    if let Some(nonce) = nonce {
        header.insert("nonce".into(), json!(nonce));
    }
    header.insert("url".into(), json!(url.as_str()));

    let protected = base64url(&serde_json::to_vec(&Value::Object(header))?);
    let payload = match payload {
        Some(value) => base64url(&serde_json::to_vec(value)?),
        None => String::new(),
    };
    let signature = base64url(&key.sign(format!("{protected}.{payload}").as_bytes())?);
    Ok(Jws { protected, payload, signature })
}

/// Build the External Account Binding inner JWS (RFC 8555 section 7.3.4):
/// the account public JWK as payload, MAC-signed under the CA-issued key.
pub fn external_account_binding(
    kid: &str,
    mac_key: &MacKey,
    account_key: &AccountKey,
    new_account_url: &Url,
) -> Result<Jws> {
    let header = json!({
        "alg": mac_key.algorithm().as_str(),
        "kid": kid,
        "url": new_account_url.as_str(),
    });
    let protected = base64url(&serde_json::to_vec(&header)?);
    let payload = base64url(&serde_json::to_vec(&account_key.public_jwk())?);
    let signature = base64url(&mac_key.sign(format!("{protected}.{payload}").as_bytes())?);
    Ok(Jws { protected, payload, signature })
}

/// Build the key-change inner JWS (RFC 8555 section 7.3.5): signed by the
/// *new* key with its JWK inline, authorizing the replacement of `old_key`.
pub fn key_change_inner(
    new_key: &AccountKey,
    old_key: &AccountKey,
    account_url: &Url,
    key_change_url: &Url,
) -> Result<Jws> {
    let payload = json!({
        "account": account_url.as_str(),
        "oldKey": old_key.public_jwk(),
    });
    sign_request(
        key_change_url,
        new_key,
        KeyBinding::EmbeddedJwk,
        None,
        Some(&payload),
    )
}
