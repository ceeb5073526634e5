//! Certificate chains: download, alternate chains, PEM output and
//! revocation (RFC 8555 sections 7.4.2 and 7.6).

use crate::crypto::encoding::base64url;
use crate::crypto::{AccountKey, KeyBinding};
use crate::directory::ResourceKind;
use crate::error::{AcmeError, Result};
use crate::session::{Login, Session};
use crate::transport::CONTENT_TYPE_PEM_CHAIN;
use crate::types::RevocationReason;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use url::Url;

/// An issued certificate chain. The chain is downloaded lazily and is
/// immutable once fetched; the first entry is the end-entity certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    location: Url,

    #[serde(skip)]
    login: Option<Login>,

    /// The chain as served, PEM order preserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chain_pem: Option<String>,

    #[serde(skip)]
    alternates: Vec<Url>,
}

impl Login {
    /// Bind a certificate resource at a known URL
    pub fn bind_certificate(&self, url: Url) -> Certificate {
        Certificate {
            location: url,
            login: Some(self.clone()),
            chain_pem: None,
            alternates: Vec::new(),
        }
    }
}

impl Certificate {
    /// The certificate URL
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Bind a deserialized certificate to a login; exactly once
    pub fn rebind(&mut self, login: &Login) -> Result<()> {
        if self.login.is_some() {
            return Err(AcmeError::invalid_input("resource is already bound to a login"));
        }
        self.login = Some(login.clone());
        Ok(())
    }

    fn login(&self) -> Result<&Login> {
        self.login
            .as_ref()
            .ok_or_else(|| AcmeError::protocol("resource is not bound to a login"))
    }

    /// Download the chain. Idempotent; a chain that is already present
    /// is kept.
    pub async fn download(&mut self) -> Result<()> {
        if self.chain_pem.is_some() {
            return Ok(());
        }
        let login = self.login()?.clone();
        let response = login
            .post(&self.location, None, Some(CONTENT_TYPE_PEM_CHAIN))
            .await?;

        let text = String::from_utf8(response.body.clone())
            .map_err(|_| AcmeError::protocol("certificate chain is not valid UTF-8"))?;
        let blocks = pem::parse_many(text.as_bytes())
            .map_err(|e| AcmeError::protocol(format!("malformed certificate chain: {e}")))?;
        if !blocks.iter().any(|block| block.tag() == "CERTIFICATE") {
            return Err(AcmeError::protocol("response carries no certificate"));
        }

        self.alternates = response.links("alternate").cloned().collect();
        self.chain_pem = Some(text);
        info!(certificate = %self.location, "certificate chain downloaded");
        Ok(())
    }

    /// The downloaded chain as PEM text
    pub fn chain_pem(&self) -> Option<&str> {
        self.chain_pem.as_deref()
    }

    /// The chain as DER certificates, first entry end-entity
    pub fn certificates(&self) -> Result<Vec<Vec<u8>>> {
        let text = self
            .chain_pem
            .as_deref()
            .ok_or_else(|| AcmeError::protocol("certificate chain is not downloaded"))?;
        let blocks = pem::parse_many(text.as_bytes())
            .map_err(|e| AcmeError::protocol(format!("malformed certificate chain: {e}")))?;
        Ok(blocks
            .into_iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .map(|block| block.contents().to_vec())
            .collect())
    }

    /// The end-entity certificate in DER form
    pub fn end_entity_der(&self) -> Result<Vec<u8>> {
        self.certificates()?
            .into_iter()
            .next()
            .ok_or_else(|| AcmeError::protocol("certificate chain is empty"))
    }

    /// Alternate chain URLs advertised via `Link: rel="alternate"`.
    /// Populated by [`download`](Self::download).
    pub fn alternates(&self) -> &[Url] {
        &self.alternates
    }

    /// The alternate chain at the given index, as an undownloaded
    /// certificate resource
    pub fn alternate(&self, index: usize) -> Result<Certificate> {
        let url = self.alternates.get(index).cloned().ok_or_else(|| {
            AcmeError::invalid_input(format!("no alternate chain at index {index}"))
        })?;
        Ok(self.login()?.bind_certificate(url))
    }

    /// Write the chain as consecutive `CERTIFICATE` PEM blocks, in the
    /// order the server returned them
    pub fn write_pem(&self, out: &mut dyn std::io::Write) -> Result<()> {
        let config = pem::EncodeConfig::default().set_line_ending(pem::LineEnding::LF);
        for der in self.certificates()? {
            let block = pem::Pem::new("CERTIFICATE", der);
            out.write_all(pem::encode_config(&block, config).as_bytes())?;
        }
        Ok(())
    }

    /// Revoke this certificate, authenticated by the account key
    pub async fn revoke(&mut self, reason: Option<RevocationReason>) -> Result<()> {
        self.download().await?;
        let login = self.login()?.clone();
        Self::revoke_by_account(&login, &self.end_entity_der()?, reason).await
    }

    /// Revoke a certificate given in DER form, authenticated by the
    /// account key (`kid` binding)
    pub async fn revoke_by_account(
        login: &Login,
        cert_der: &[u8],
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        let url = login
            .session()
            .resource_url(ResourceKind::RevokeCert)
            .await?;
        let payload = revocation_payload(cert_der, reason);
        login.post(&url, Some(&payload), None).await?;
        info!("certificate revoked");
        Ok(())
    }

    /// Revoke a certificate by proving possession of the key that signed
    /// its CSR: the JWS embeds that key's JWK and carries no `kid`. For
    /// when the account is no longer available.
    pub async fn revoke_by_key(
        session: &Session,
        certificate_key: &AccountKey,
        cert_der: &[u8],
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        let url = session.resource_url(ResourceKind::RevokeCert).await?;
        let payload = revocation_payload(cert_der, reason);
        session
            .send_signed(
                &url,
                certificate_key,
                KeyBinding::EmbeddedJwk,
                Some(&payload),
                None,
            )
            .await?;
        info!("certificate revoked with its own key");
        Ok(())
    }

    /// The renewal information for this certificate (draft ARI)
    #[cfg(feature = "ari")]
    pub async fn renewal_info(&mut self) -> Result<crate::renewal::RenewalInfo> {
        self.download().await?;
        let login = self.login()?.clone();
        login.renewal_info(&self.end_entity_der()?).await
    }
}

fn revocation_payload(cert_der: &[u8], reason: Option<RevocationReason>) -> Value {
    let mut payload = serde_json::Map::new();
    payload.insert("certificate".into(), json!(base64url(cert_der)));
    if let Some(reason) = reason {
        payload.insert("reason".into(), json!(reason.code()));
    }
    Value::Object(payload)
}
