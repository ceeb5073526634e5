//! HTTPS request/response plumbing: header extraction, content dispatch
//! and problem mapping. Nonce handling and the badNonce retry live one
//! level up, in the session.

use crate::clock::Clock;
use crate::crypto::Jws;
use crate::crypto::encoding::is_base64url;
use crate::error::{AcmeError, Result};
use crate::problem::Problem;
use crate::timefmt;
use jiff::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Content type of JWS request bodies
pub(crate) const CONTENT_TYPE_JOSE: &str = "application/jose+json";
/// Content type of JSON responses
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type of problem documents
pub(crate) const CONTENT_TYPE_PROBLEM: &str = "application/problem+json";
/// Content type of certificate chains
pub(crate) const CONTENT_TYPE_PEM_CHAIN: &str = "application/pem-certificate-chain";

/// A parsed `Link` header entry
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub rel: String,
    pub url: Url,
}

/// A response with the ACME-relevant headers pulled out
#[derive(Debug)]
pub(crate) struct AcmeResponse {
    pub status: u16,
    /// The URL the response was served from, base for relative URIs
    pub final_url: Url,
    pub location: Option<Url>,
    pub retry_after: Option<Timestamp>,
    pub replay_nonce: Option<String>,
    pub links: Vec<Link>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub expires: Option<Timestamp>,
    pub max_age: Option<u64>,
    pub body: Vec<u8>,
}

impl AcmeResponse {
    /// Deserialize the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| AcmeError::protocol(format!("malformed JSON response: {e}")))
    }

    /// All link targets with the given relation
    pub fn links(&self, rel: &str) -> impl Iterator<Item = &Url> {
        self.links.iter().filter_map(move |l| (l.rel == rel).then_some(&l.url))
    }

    /// The `Location` header, required on resource-creating responses
    pub fn require_location(&self) -> Result<Url> {
        self.location
            .clone()
            .ok_or_else(|| AcmeError::protocol("response carries no Location header"))
    }

    fn has_content_type(&self, wanted: &str) -> bool {
        self.content_type.as_deref() == Some(wanted)
    }

    /// Whether the response carries a non-empty JSON body
    pub fn has_json_body(&self) -> bool {
        !self.body.is_empty() && self.has_content_type(CONTENT_TYPE_JSON)
    }

    /// Map HTTP errors to the typed error taxonomy. A status of 400 or
    /// above with a problem document becomes a server error; without one
    /// it is a protocol error.
    pub fn error_for_status(self) -> Result<AcmeResponse> {
        if self.status < 400 {
            return Ok(self);
        }
        if self.has_content_type(CONTENT_TYPE_PROBLEM) {
            let mut problem: Problem = self.json()?;
            problem.resolve_uris(&self.final_url);
            return Err(AcmeError::Server { problem, retry_after: self.retry_after });
        }
        Err(AcmeError::protocol(format!(
            "HTTP {} from {} without problem document",
            self.status, self.final_url
        )))
    }
}

/// Thin wrapper over the HTTP client, carrying the headers every ACME
/// request sends
pub(crate) struct Transport {
    http: reqwest::Client,
    accept_language: String,
    clock: Arc<dyn Clock>,
}

impl Transport {
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        user_agent: &str,
        accept_language: String,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { http, accept_language, clock })
    }

    /// Anonymous GET: directory, renewal information
    pub async fn get(
        &self,
        url: &Url,
        if_modified_since: Option<&str>,
    ) -> Result<AcmeResponse> {
        let mut request = self.http.get(url.clone());
        if let Some(since) = if_modified_since {
            request = request.header("If-Modified-Since", since);
        }
        self.execute(request, url).await
    }

    /// HEAD, used against the newNonce endpoint
    pub async fn head(&self, url: &Url) -> Result<AcmeResponse> {
        self.execute(self.http.head(url.clone()), url).await
    }

    /// POST a signed JWS body
    pub async fn post_jose(
        &self,
        url: &Url,
        jws: &Jws,
        accept: Option<&str>,
    ) -> Result<AcmeResponse> {
        let mut request = self
            .http
            .post(url.clone())
            .header("Content-Type", CONTENT_TYPE_JOSE)
            .body(serde_json::to_vec(jws)?);
        if let Some(accept) = accept {
            request = request.header("Accept", accept);
        }
        self.execute(request, url).await
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<AcmeResponse> {
        let response = request
            .header("Accept-Language", &self.accept_language)
            .send()
            .await?;
        let parsed = self.parse_response(response, url).await?;
        debug!(url = %parsed.final_url, status = parsed.status, "ACME response");
        Ok(parsed)
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
        request_url: &Url,
    ) -> Result<AcmeResponse> {
        let status = response.status().as_u16();
        let final_url: Url = response.url().clone();
        let headers = response.headers();
        let now = self.clock.now();

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        let replay_nonce = header("replay-nonce").and_then(|nonce| {
            if is_base64url(&nonce) {
                Some(nonce)
            } else {
                warn!(%request_url, "discarding Replay-Nonce that is not base64url");
                None
            }
        });

        let location = header("location").and_then(|l| final_url.join(&l).ok());
        let retry_after =
            header("retry-after").and_then(|v| timefmt::parse_retry_after(&v, now));
        let expires = header("expires").and_then(|v| timefmt::parse_http_date(&v).ok());
        let max_age = header("cache-control").and_then(|v| parse_max_age(&v));
        let last_modified = header("last-modified");

        let content_type = header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());

        let mut links = Vec::new();
        for value in headers.get_all("link") {
            if let Ok(value) = value.to_str() {
                for (rel, target) in parse_link_value(value) {
                    match final_url.join(&target) {
                        Ok(url) => links.push(Link { rel, url }),
                        Err(_) => warn!(%target, "discarding unparsable Link target"),
                    }
                }
            }
        }

        let body = response.bytes().await?.to_vec();
        Ok(AcmeResponse {
            status,
            final_url,
            location,
            retry_after,
            replay_nonce,
            links,
            content_type,
            last_modified,
            expires,
            max_age,
            body,
        })
    }
}

/// Extract `max-age` from a `Cache-Control` header value
fn parse_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        let (name, secs) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            secs.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Parse one `Link` header value into `(rel, target)` pairs. A header may
/// carry several comma-separated links, each with several parameters, and
/// a `rel` parameter may name several whitespace-separated relations.
fn parse_link_value(value: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else { break };
        let target = rest[start + 1..start + end].trim().to_owned();
        let after = &rest[start + end + 1..];
        let params_end = after.find(',').unwrap_or(after.len());
        for param in after[..params_end].split(';') {
            let Some((name, val)) = param.split_once('=') else { continue };
            if name.trim().eq_ignore_ascii_case("rel") {
                for rel in val.trim().trim_matches('"').split_whitespace() {
                    out.push((rel.to_owned(), target.clone()));
                }
            }
        }
        rest = &after[params_end..];
        rest = rest.strip_prefix(',').unwrap_or(rest);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_link() {
        let links = parse_link_value("<https://ca.example.com/chain/1>; rel=\"alternate\"");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, "alternate");
        assert_eq!(links[0].1, "https://ca.example.com/chain/1");
    }

    #[test]
    fn parses_multiple_links_and_rels() {
        let links = parse_link_value(
            "<https://ca.example.com/dir>; rel=\"index\", \
             </terms>; rel=\"terms-of-service up\"",
        );
        assert_eq!(links.len(), 3);
        assert_eq!(links[0], ("index".into(), "https://ca.example.com/dir".into()));
        assert_eq!(links[1], ("terms-of-service".into(), "/terms".into()));
        assert_eq!(links[2], ("up".into(), "/terms".into()));
    }

    #[test]
    fn ignores_link_without_rel() {
        assert!(parse_link_value("<https://ca.example.com/x>; title=\"x\"").is_empty());
        assert!(parse_link_value("garbage").is_empty());
    }

    #[test]
    fn parses_cache_control_max_age() {
        assert_eq!(parse_max_age("public, max-age=600"), Some(600));
        assert_eq!(parse_max_age("max-age=0"), Some(0));
        assert_eq!(parse_max_age("no-store"), None);
    }
}
