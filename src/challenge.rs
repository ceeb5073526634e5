//! Challenges and their proof material (RFC 8555 section 8).
//!
//! The engine computes tokens and key authorizations; placing files, DNS
//! records or ALPN certificates is the caller's business.

use crate::clock::Clock;
use crate::crypto::encoding::{base64url, sha256};
use crate::error::{AcmeError, Result};
use crate::poll::{self, CancelSignal, Pollable};
use crate::problem::Problem;
use crate::resource::ResourceState;
use crate::session::Login;
use crate::types::ChallengeStatus;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// The challenge representation the server returns. The shape is open
/// over `type`, so CA-defined challenge types are carried verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeData {
    /// Challenge type, e.g. `http-01`, `dns-01`, `tls-alpn-01`
    #[serde(rename = "type")]
    pub kind: String,

    /// The challenge URL
    pub url: Url,

    /// Challenge status
    pub status: ChallengeStatus,

    /// When the server validated the challenge
    #[serde(default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub validated: Option<Timestamp>,

    /// Why validation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,

    /// The random token of token-bearing challenge types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// An ACME challenge resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Challenge {
    state: ResourceState<ChallengeData>,
}

impl Login {
    /// Bind a challenge at a known URL. The body is always fetched
    /// first, so the challenge type is established before use.
    pub async fn bind_challenge(&self, url: Url) -> Result<Challenge> {
        let mut challenge = Challenge {
            state: ResourceState::bound(self, url),
        };
        challenge.state.fetch().await?;
        Ok(challenge)
    }
}

impl Challenge {
    /// The `http-01` challenge type
    pub const HTTP_01: &'static str = "http-01";
    /// The `dns-01` challenge type
    pub const DNS_01: &'static str = "dns-01";
    /// The `tls-alpn-01` challenge type (RFC 8737)
    pub const TLS_ALPN_01: &'static str = "tls-alpn-01";

    pub(crate) fn from_data(login: &Login, data: ChallengeData) -> Self {
        let url = data.url.clone();
        Self {
            state: ResourceState::with_body(login, url, data),
        }
    }

    /// The challenge URL
    pub fn location(&self) -> &Url {
        self.state.location()
    }

    /// Bind a deserialized challenge to a login; exactly once
    pub fn rebind(&mut self, login: &Login) -> Result<()> {
        self.state.rebind(login)
    }

    /// The cached challenge body, if loaded
    pub fn data(&self) -> Option<&ChallengeData> {
        self.state.body()
    }

    /// The challenge type, if loaded
    pub fn kind(&self) -> Option<&str> {
        self.data().map(|d| d.kind.as_str())
    }

    /// The cached challenge status
    pub fn status(&self) -> Option<ChallengeStatus> {
        self.data().map(|d| d.status)
    }

    /// Fetch the challenge, returning the server's `Retry-After` hint
    pub async fn fetch(&mut self) -> Result<Option<Timestamp>> {
        self.state.fetch().await
    }

    /// Load the challenge body if it has never been fetched
    pub async fn ensure_loaded(&mut self) -> Result<&ChallengeData> {
        self.state.ensure_loaded().await
    }

    /// The server-issued token of a token-bearing challenge
    pub fn token(&self) -> Result<&str> {
        self.state
            .require_body()?
            .token
            .as_deref()
            .ok_or_else(|| AcmeError::protocol("challenge carries no token"))
    }

    /// The key authorization: `token || "." || key thumbprint`
    /// (RFC 8555 section 8.1)
    pub fn key_authorization(&self) -> Result<String> {
        let thumbprint = self.state.login()?.key_thumbprint();
        Ok(format!("{}.{}", self.token()?, thumbprint))
    }

    /// The path under which an `http-01` responder must serve the
    /// [key authorization](Self::key_authorization)
    pub fn http01_resource_path(&self) -> Result<String> {
        self.require_kind(Self::HTTP_01)?;
        Ok(format!("/.well-known/acme-challenge/{}", self.token()?))
    }

    /// The TXT record value for `_acme-challenge.<domain>`:
    /// base64url(SHA-256(key authorization)) (RFC 8555 section 8.4)
    pub fn dns01_record_value(&self) -> Result<String> {
        self.require_kind(Self::DNS_01)?;
        Ok(base64url(&sha256(self.key_authorization()?.as_bytes())))
    }

    /// The SHA-256 digest of the key authorization, to embed in the
    /// acmeIdentifier extension of a `tls-alpn-01` certificate (RFC 8737)
    pub fn tls_alpn01_digest(&self) -> Result<[u8; 32]> {
        self.require_kind(Self::TLS_ALPN_01)?;
        Ok(sha256(self.key_authorization()?.as_bytes()))
    }

    fn require_kind(&self, wanted: &str) -> Result<()> {
        let kind = &self.state.require_body()?.kind;
        if kind != wanted {
            return Err(AcmeError::invalid_input(format!(
                "challenge is {kind}, not {wanted}"
            )));
        }
        Ok(())
    }

    /// Tell the server the response is in place (RFC 8555 section 7.5.1).
    /// Triggered once; afterwards the challenge is polled.
    pub async fn trigger(&mut self) -> Result<()> {
        let data = self.ensure_loaded().await?;
        if data.status != ChallengeStatus::Pending {
            return Err(AcmeError::invalid_input(format!(
                "a challenge in status {} cannot be triggered",
                data.status
            )));
        }
        let login = self.state.login()?.clone();
        let payload = json!({});
        let response = login.post(self.location(), Some(&payload), None).await?;
        if response.has_json_body() {
            self.state.update_from(&response)?;
        }
        info!(challenge = %self.location(), "challenge triggered");
        Ok(())
    }

    /// Poll until the challenge reaches one of the terminal statuses
    pub async fn wait_for_status(
        &mut self,
        terminal: &[ChallengeStatus],
        timeout: Duration,
        cancel: Option<&CancelSignal>,
    ) -> Result<ChallengeStatus> {
        poll::wait_for_status(self, terminal, timeout, cancel).await
    }
}

impl Pollable for Challenge {
    type Status = ChallengeStatus;

    fn current_status(&self) -> Option<ChallengeStatus> {
        self.status()
    }

    fn poll_clock(&self) -> Result<Arc<dyn Clock>> {
        Ok(self.state.login()?.session().clock())
    }

    async fn refresh(&mut self) -> Result<Option<Timestamp>> {
        self.state.fetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountKey;
    use crate::session::Session;

    fn challenge_with(kind: &str, token: &str) -> (Challenge, Login) {
        let login = Login::new(
            Session::new("https://ca.example.com/directory").unwrap(),
            Url::parse("https://ca.example.com/acct/1").unwrap(),
            AccountKey::generate_p256().unwrap(),
        );
        let data = ChallengeData {
            kind: kind.to_owned(),
            url: Url::parse("https://ca.example.com/acme/chall/1").unwrap(),
            status: ChallengeStatus::Pending,
            validated: None,
            error: None,
            token: Some(token.to_owned()),
        };
        (Challenge::from_data(&login, data), login)
    }

    #[test]
    fn key_authorization_concatenates_token_and_thumbprint() {
        let (challenge, login) = challenge_with(Challenge::HTTP_01, "DGyRejmCefe7v4NfDGDKfA");
        assert_eq!(
            challenge.key_authorization().unwrap(),
            format!("DGyRejmCefe7v4NfDGDKfA.{}", login.key_thumbprint())
        );
    }

    #[test]
    fn http01_path_carries_the_token() {
        let (challenge, _login) = challenge_with(Challenge::HTTP_01, "DGyRejmCefe7v4NfDGDKfA");
        assert_eq!(
            challenge.http01_resource_path().unwrap(),
            "/.well-known/acme-challenge/DGyRejmCefe7v4NfDGDKfA"
        );
    }

    #[test]
    fn dns01_value_is_digest_of_key_authorization() {
        let (challenge, _login) = challenge_with(Challenge::DNS_01, "token");
        let expected = base64url(&sha256(
            challenge.key_authorization().unwrap().as_bytes(),
        ));
        assert_eq!(challenge.dns01_record_value().unwrap(), expected);
    }

    #[test]
    fn subtype_helpers_check_the_type() {
        let (challenge, _login) = challenge_with(Challenge::DNS_01, "token");
        assert!(challenge.http01_resource_path().is_err());
        assert!(challenge.tls_alpn01_digest().is_err());
        assert!(challenge.dns01_record_value().is_ok());
    }

    #[test]
    fn challenge_location_follows_embedded_url() {
        let (challenge, _login) = challenge_with(Challenge::TLS_ALPN_01, "token");
        assert_eq!(
            challenge.location().as_str(),
            "https://ca.example.com/acme/chall/1"
        );
        assert_eq!(challenge.kind(), Some(Challenge::TLS_ALPN_01));
    }
}
