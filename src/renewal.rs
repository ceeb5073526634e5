//! ACME Renewal Information (draft-ietf-acme-ari): when the CA would
//! like a certificate to be replaced.

use crate::crypto::encoding::base64url;
use crate::directory::ResourceKind;
use crate::error::{AcmeError, Result};
use crate::session::{Login, Session};
use jiff::Timestamp;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use x509_parser::prelude::{FromDer, X509Certificate};

/// The window in which the CA suggests renewing. `start ≤ end` always
/// holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuggestedWindow {
    /// Start of the suggested window
    #[serde(with = "crate::timefmt::ts")]
    pub start: Timestamp,

    /// End of the suggested window
    #[serde(with = "crate::timefmt::ts")]
    pub end: Timestamp,
}

impl SuggestedWindow {
    /// Whether `at` lies before the window: no renewal needed yet
    pub fn renewal_not_required(&self, at: Timestamp) -> bool {
        at < self.start
    }

    /// Whether `at` lies in `[start, end)`: renew now
    pub fn renewal_recommended(&self, at: Timestamp) -> bool {
        at >= self.start && at < self.end
    }

    /// Whether `at` lies at or past the window end: renewal is overdue
    pub fn renewal_overdue(&self, at: Timestamp) -> bool {
        at >= self.end
    }
}

/// The renewal information document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfoData {
    /// The suggested renewal window
    pub suggested_window: SuggestedWindow,

    /// Human-readable page explaining the suggestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation_url: Option<Url>,
}

/// The renewal information resource of one certificate. Reads are
/// anonymous GETs; no account is involved.
#[derive(Debug)]
pub struct RenewalInfo {
    session: Session,
    location: Url,
    body: Option<RenewalInfoData>,
    retry_after: Option<Timestamp>,
}

impl Login {
    /// The renewal information for a certificate given in DER form
    pub async fn renewal_info(&self, cert_der: &[u8]) -> Result<RenewalInfo> {
        RenewalInfo::for_certificate(self.session().clone(), cert_der).await
    }
}

impl RenewalInfo {
    /// Locate the renewal information for a certificate given in DER form
    pub async fn for_certificate(session: Session, cert_der: &[u8]) -> Result<Self> {
        let base = session.resource_url(ResourceKind::RenewalInfo).await?;
        let mut location = base.as_str().trim_end_matches('/').to_owned();
        location.push('/');
        location.push_str(&certificate_id(cert_der)?);
        let location = Url::parse(&location)
            .map_err(|e| AcmeError::protocol(format!("invalid renewal info URL: {e}")))?;
        Ok(Self { session, location, body: None, retry_after: None })
    }

    /// The renewal info URL
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// The `Retry-After` instant of the most recent fetch, if any
    pub fn retry_after(&self) -> Option<Timestamp> {
        self.retry_after
    }

    /// Fetch the document, returning the server's `Retry-After` hint
    pub async fn fetch(&mut self) -> Result<Option<Timestamp>> {
        let response = self
            .session
            .transport()
            .get(&self.location, None)
            .await?
            .error_for_status()?;
        let data: RenewalInfoData = response.json()?;
        if data.suggested_window.start > data.suggested_window.end {
            return Err(AcmeError::protocol("suggested window starts after its end"));
        }
        self.retry_after = response.retry_after;
        self.body = Some(data);
        Ok(response.retry_after)
    }

    /// Load the document if it has never been fetched
    pub async fn ensure_loaded(&mut self) -> Result<&RenewalInfoData> {
        if self.body.is_none() {
            self.fetch().await.map_err(AcmeError::lazy_load)?;
        }
        self.require_body()
    }

    fn require_body(&self) -> Result<&RenewalInfoData> {
        self.body
            .as_ref()
            .ok_or_else(|| AcmeError::protocol("renewal info is not loaded"))
    }

    /// The suggested renewal window
    pub fn suggested_window(&self) -> Result<&SuggestedWindow> {
        Ok(&self.require_body()?.suggested_window)
    }

    /// A uniformly random renewal time in `[max(now, start), end − frequency)`,
    /// or `None` when that interval is empty. `frequency` is how often the
    /// caller checks for renewals.
    pub fn random_proposal(&self, frequency: Option<Duration>) -> Result<Option<Timestamp>> {
        let now = self.session.clock().now();
        self.random_proposal_at(frequency, now, &mut rand::thread_rng())
    }

    /// [`random_proposal`](Self::random_proposal) against an explicit
    /// instant and RNG, for deterministic callers and tests
    pub fn random_proposal_at(
        &self,
        frequency: Option<Duration>,
        now: Timestamp,
        rng: &mut impl Rng,
    ) -> Result<Option<Timestamp>> {
        let window = self.suggested_window()?;
        let start = window.start.max(now).as_millisecond();
        let frequency = frequency
            .map(|f| i64::try_from(f.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let end = window.end.as_millisecond().saturating_sub(frequency);
        if end <= start {
            return Ok(None);
        }
        let proposal = rng.gen_range(start..end);
        Timestamp::from_millisecond(proposal)
            .map(Some)
            .map_err(|e| AcmeError::protocol(format!("proposal out of range: {e}")))
    }
}

/// The ARI certificate identifier:
/// `base64url(issuer name DER) "." base64url(serial number)`
pub fn certificate_id(cert_der: &[u8]) -> Result<String> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| AcmeError::crypto(format!("cannot parse certificate: {e}")))?;
    let issuer = base64url(cert.tbs_certificate.issuer.as_raw());
    let serial = base64url(cert.tbs_certificate.raw_serial());
    Ok(format!("{issuer}.{serial}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encoding::base64url_decode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn window(start: &str, end: &str) -> SuggestedWindow {
        SuggestedWindow {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
        }
    }

    fn info_with(window: SuggestedWindow) -> RenewalInfo {
        RenewalInfo {
            session: Session::new("https://ca.example.com/directory").unwrap(),
            location: Url::parse("https://ca.example.com/renewal-info/aGk.AQ").unwrap(),
            body: Some(RenewalInfoData { suggested_window: window, explanation_url: None }),
            retry_after: None,
        }
    }

    #[test]
    fn window_helpers_partition_the_timeline() {
        let w = window("2024-06-01T00:00:00Z", "2024-06-08T00:00:00Z");
        let before: Timestamp = "2024-05-31T23:59:59Z".parse().unwrap();
        let at_start: Timestamp = "2024-06-01T00:00:00Z".parse().unwrap();
        let inside: Timestamp = "2024-06-04T12:00:00Z".parse().unwrap();
        let at_end: Timestamp = "2024-06-08T00:00:00Z".parse().unwrap();

        assert!(w.renewal_not_required(before));
        assert!(!w.renewal_not_required(at_start));
        assert!(w.renewal_recommended(at_start));
        assert!(w.renewal_recommended(inside));
        assert!(!w.renewal_recommended(at_end));
        assert!(w.renewal_overdue(at_end));
        assert!(!w.renewal_overdue(inside));
    }

    #[test]
    fn random_proposal_stays_in_the_interval() {
        let info = info_with(window("2024-06-01T00:00:00Z", "2024-06-08T00:00:00Z"));
        let now: Timestamp = "2024-06-03T00:00:00Z".parse().unwrap();
        let frequency = Some(Duration::from_secs(24 * 3600));
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..64 {
            let at = info
                .random_proposal_at(frequency, now, &mut rng)
                .unwrap()
                .unwrap();
            assert!(at >= now);
            assert!(at < "2024-06-07T00:00:00Z".parse().unwrap());
        }
    }

    #[test]
    fn random_proposal_empty_interval() {
        let info = info_with(window("2024-06-01T00:00:00Z", "2024-06-08T00:00:00Z"));
        let now: Timestamp = "2024-06-03T00:00:00Z".parse().unwrap();
        // the frequency consumes the whole remaining window
        let frequency = Some(Duration::from_secs(6 * 24 * 3600));
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(info.random_proposal_at(frequency, now, &mut rng).unwrap(), None);

        // now already past the window
        let late: Timestamp = "2024-06-09T00:00:00Z".parse().unwrap();
        assert_eq!(info.random_proposal_at(None, late, &mut rng).unwrap(), None);
    }

    #[test]
    fn parses_wire_shape() {
        let data: RenewalInfoData = serde_json::from_str(
            r#"{
                "suggestedWindow": {
                    "start": "2024-01-02T04:00:00Z",
                    "end": "2024-01-03T04:00:00Z"
                },
                "explanationUrl": "https://ca.example.com/docs/ari"
            }"#,
        )
        .unwrap();
        assert!(data.suggested_window.start < data.suggested_window.end);
        assert!(data.explanation_url.is_some());
    }

    #[test]
    fn certificate_id_shape() {
        let params = rcgen::CertificateParams::new(vec!["ari.example.org".into()]).unwrap();
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        let der = cert.der().to_vec();

        let id = certificate_id(&der).unwrap();
        let (issuer, serial) = id.split_once('.').unwrap();
        let (_, parsed) = X509Certificate::from_der(&der).unwrap();
        assert_eq!(
            base64url_decode(issuer).unwrap(),
            parsed.tbs_certificate.issuer.as_raw()
        );
        assert_eq!(
            base64url_decode(serial).unwrap(),
            parsed.tbs_certificate.raw_serial()
        );
        // stable regardless of representation
        assert_eq!(certificate_id(&der).unwrap(), id);
    }
}
