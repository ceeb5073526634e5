//! Certificate orders: building, finalizing and polling them
//! (RFC 8555 section 7.4, auto-renewal per RFC 8739).

use crate::authorization::Authorization;
use crate::certificate::Certificate;
use crate::clock::Clock;
use crate::crypto::encoding::base64url;
use crate::directory::ResourceKind;
use crate::error::{AcmeError, Result};
use crate::poll::{self, CancelSignal, Pollable};
use crate::problem::Problem;
use crate::resource::ResourceState;
use crate::session::Login;
use crate::types::{Identifier, OrderStatus};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// The order representation the server returns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    /// Order status
    pub status: OrderStatus,

    /// When the server forgets an unfinished order
    #[serde(default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub expires: Option<Timestamp>,

    /// The identifiers this order certifies
    pub identifiers: Vec<Identifier>,

    /// Requested start of the certificate validity
    #[serde(default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub not_before: Option<Timestamp>,

    /// Requested end of the certificate validity
    #[serde(default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub not_after: Option<Timestamp>,

    /// Why the order became invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,

    /// Authorization URLs, one per identifier
    #[serde(default)]
    pub authorizations: Vec<Url>,

    /// Finalization endpoint, takes the CSR
    pub finalize: Url,

    /// Certificate URL, present once the order is valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Url>,

    /// Auto-renewal settings (RFC 8739)
    #[serde(rename = "auto-renewal", skip_serializing_if = "Option::is_none")]
    pub auto_renewal: Option<AutoRenewalOptions>,

    /// The certificate profile this order was placed under
    #[cfg(feature = "profiles")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// The `auto-renewal` block of an order (RFC 8739 section 3.1.1)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoRenewalOptions {
    /// Start of the auto-renewal period
    #[serde(rename = "start-date", default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Timestamp>,

    /// End of the auto-renewal period
    #[serde(rename = "end-date", default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Timestamp>,

    /// Lifetime of each short-term certificate, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<u64>,

    /// Validity overlap between consecutive certificates, in seconds
    #[serde(rename = "lifetime-adjust", skip_serializing_if = "Option::is_none")]
    pub lifetime_adjust: Option<u64>,

    /// Request unauthenticated certificate GET
    #[serde(rename = "allow-certificate-get", skip_serializing_if = "Option::is_none")]
    pub allow_certificate_get: Option<bool>,
}

/// Validity configuration of an order under construction. The plain
/// notBefore/notAfter window and the auto-renewal block are mutually
/// exclusive shapes.
#[derive(Debug, Clone, Default)]
enum OrderValidity {
    #[default]
    Unset,
    Window {
        not_before: Option<Timestamp>,
        not_after: Option<Timestamp>,
    },
    AutoRenewal(AutoRenewalOptions),
}

/// Builder for a new order
pub struct OrderBuilder {
    login: Login,
    identifiers: Vec<Identifier>,
    validity: OrderValidity,
    #[cfg(feature = "profiles")]
    profile: Option<String>,
}

impl Login {
    /// Start building an order under this account
    pub fn new_order(&self) -> OrderBuilder {
        OrderBuilder {
            login: self.clone(),
            identifiers: Vec::new(),
            validity: OrderValidity::default(),
            #[cfg(feature = "profiles")]
            profile: None,
        }
    }

    /// Bind an order resource at a known URL
    pub fn bind_order(&self, url: Url) -> Order {
        Order {
            state: ResourceState::bound(self, url),
        }
    }
}

impl OrderBuilder {
    /// Add an identifier. Duplicates are dropped, insertion order kept.
    pub fn identifier(mut self, identifier: Identifier) -> Self {
        if !self.identifiers.contains(&identifier) {
            self.identifiers.push(identifier);
        }
        self
    }

    /// Add a DNS identifier; the domain is ACE-encoded
    pub fn domain(self, domain: &str) -> Result<Self> {
        Ok(self.identifier(Identifier::dns(domain)?))
    }

    /// Request the certificate validity to start at the given instant.
    /// Mutually exclusive with auto-renewal.
    pub fn not_before(mut self, at: Timestamp) -> Result<Self> {
        match &mut self.validity {
            OrderValidity::AutoRenewal(_) => Err(AcmeError::invalid_input(
                "notBefore and auto-renewal are mutually exclusive",
            )),
            OrderValidity::Window { not_before, .. } => {
                *not_before = Some(at);
                Ok(self)
            }
            OrderValidity::Unset => {
                self.validity = OrderValidity::Window { not_before: Some(at), not_after: None };
                Ok(self)
            }
        }
    }

    /// Request the certificate validity to end at the given instant.
    /// Mutually exclusive with auto-renewal.
    pub fn not_after(mut self, at: Timestamp) -> Result<Self> {
        match &mut self.validity {
            OrderValidity::AutoRenewal(_) => Err(AcmeError::invalid_input(
                "notAfter and auto-renewal are mutually exclusive",
            )),
            OrderValidity::Window { not_after, .. } => {
                *not_after = Some(at);
                Ok(self)
            }
            OrderValidity::Unset => {
                self.validity = OrderValidity::Window { not_before: None, not_after: Some(at) };
                Ok(self)
            }
        }
    }

    /// Place the order with auto-renewal (RFC 8739). Mutually exclusive
    /// with notBefore/notAfter.
    pub fn auto_renewal(mut self, options: AutoRenewalOptions) -> Result<Self> {
        match self.validity {
            OrderValidity::Window { .. } => Err(AcmeError::invalid_input(
                "auto-renewal and notBefore/notAfter are mutually exclusive",
            )),
            _ => {
                self.validity = OrderValidity::AutoRenewal(options);
                Ok(self)
            }
        }
    }

    /// Select a certificate profile offered by the CA
    #[cfg(feature = "profiles")]
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    /// Submit the order
    pub async fn create(self) -> Result<Order> {
        if self.identifiers.is_empty() {
            return Err(AcmeError::invalid_input("an order needs at least one identifier"));
        }
        let session = self.login.session().clone();

        let mut claims = serde_json::Map::new();
        claims.insert("identifiers".into(), serde_json::to_value(&self.identifiers)?);
        match &self.validity {
            OrderValidity::Unset => {}
            OrderValidity::Window { not_before, not_after } => {
                if let Some(at) = not_before {
                    claims.insert("notBefore".into(), json!(at.to_string()));
                }
                if let Some(at) = not_after {
                    claims.insert("notAfter".into(), json!(at.to_string()));
                }
            }
            OrderValidity::AutoRenewal(options) => {
                if session.metadata().await?.auto_renewal.is_none() {
                    return Err(AcmeError::unsupported("the CA does not offer auto-renewal"));
                }
                claims.insert("auto-renewal".into(), serde_json::to_value(options)?);
            }
        }
        #[cfg(feature = "profiles")]
        if let Some(profile) = &self.profile {
            if !session.metadata().await?.has_profile(profile) {
                return Err(AcmeError::unsupported(format!(
                    "the CA does not offer the {profile:?} profile"
                )));
            }
            claims.insert("profile".into(), json!(profile));
        }

        let new_order_url = session.resource_url(ResourceKind::NewOrder).await?;
        let payload = Value::Object(claims);
        let response = self.login.post(&new_order_url, Some(&payload), None).await?;
        let location = response.require_location()?;
        info!(order = %location, "order placed");

        let mut state = ResourceState::bound(&self.login, location);
        state.update_from(&response)?;
        Ok(Order { state })
    }
}

/// An ACME order resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Order {
    state: ResourceState<OrderData>,
}

impl Order {
    /// The order URL
    pub fn location(&self) -> &Url {
        self.state.location()
    }

    /// Bind a deserialized order to a login; exactly once
    pub fn rebind(&mut self, login: &Login) -> Result<()> {
        self.state.rebind(login)
    }

    /// The cached order body, if loaded
    pub fn data(&self) -> Option<&OrderData> {
        self.state.body()
    }

    /// The cached order status
    pub fn status(&self) -> Option<OrderStatus> {
        self.data().map(|d| d.status)
    }

    /// The `Retry-After` instant of the most recent fetch, if any
    pub fn retry_after(&self) -> Option<Timestamp> {
        self.state.retry_after()
    }

    /// Fetch the order, returning the server's `Retry-After` hint
    pub async fn fetch(&mut self) -> Result<Option<Timestamp>> {
        self.state.fetch().await
    }

    /// Load the order body if it has never been fetched
    pub async fn ensure_loaded(&mut self) -> Result<&OrderData> {
        self.state.ensure_loaded().await
    }

    /// The authorizations to complete, one per identifier
    pub async fn authorizations(&mut self) -> Result<Vec<Authorization>> {
        let login = self.state.login()?.clone();
        let urls = self.ensure_loaded().await?.authorizations.clone();
        Ok(urls
            .into_iter()
            .map(|url| login.bind_authorization(url))
            .collect())
    }

    /// Finalize the order with a PKCS#10 CSR in DER form.
    ///
    /// Permitted while the order is `pending` or `ready`; the server has
    /// the final say. The cached body is invalidated so the next status
    /// read fetches fresh state.
    pub async fn finalize(&mut self, csr_der: &[u8]) -> Result<()> {
        let data = self.ensure_loaded().await?;
        if !matches!(data.status, OrderStatus::Pending | OrderStatus::Ready) {
            return Err(AcmeError::invalid_input(format!(
                "an order in status {} cannot be finalized",
                data.status
            )));
        }
        let finalize_url = data.finalize.clone();
        let login = self.state.login()?.clone();
        let payload = json!({"csr": base64url(csr_der)});
        login.post(&finalize_url, Some(&payload), None).await?;
        self.state.invalidate();
        info!(order = %self.location(), "order finalized");
        Ok(())
    }

    /// The issued certificate. Only available once the order is `valid`.
    pub async fn certificate(&mut self) -> Result<Certificate> {
        let data = self.ensure_loaded().await?;
        if data.status != OrderStatus::Valid {
            return Err(AcmeError::invalid_input(format!(
                "an order in status {} has no certificate yet",
                data.status
            )));
        }
        let url = data.certificate.clone().ok_or_else(|| {
            AcmeError::protocol("valid order carries no certificate URL")
        })?;
        Ok(self.state.login()?.bind_certificate(url))
    }

    /// Cancel the auto-renewal of a STAR order (RFC 8739 section 3.1.2)
    pub async fn cancel_auto_renewal(&mut self) -> Result<()> {
        let login = self.state.login()?.clone();
        if login.session().metadata().await?.auto_renewal.is_none() {
            return Err(AcmeError::unsupported("the CA does not offer auto-renewal"));
        }
        let payload = json!({"status": "canceled"});
        let response = login.post(self.location(), Some(&payload), None).await?;
        if response.has_json_body() {
            self.state.update_from(&response)?;
        }
        info!(order = %self.location(), "auto-renewal canceled");
        Ok(())
    }

    /// Poll until the order reaches one of the terminal statuses
    pub async fn wait_for_status(
        &mut self,
        terminal: &[OrderStatus],
        timeout: Duration,
        cancel: Option<&CancelSignal>,
    ) -> Result<OrderStatus> {
        poll::wait_for_status(self, terminal, timeout, cancel).await
    }
}

impl Pollable for Order {
    type Status = OrderStatus;

    fn current_status(&self) -> Option<OrderStatus> {
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

    #[test]
    fn order_data_parses_wire_shape() {
        let data: OrderData = serde_json::from_str(
            r#"{
                "status": "pending",
                "expires": "2016-01-05T14:09:07.99Z",
                "identifiers": [
                    {"type": "dns", "value": "www.example.org"},
                    {"type": "dns", "value": "example.org"}
                ],
                "notBefore": "2016-01-01T00:04:00+04:00",
                "notAfter": "2016-01-08T00:04:00+0400",
                "authorizations": [
                    "https://ca.example.com/acme/authz/PAniVnsZcis",
                    "https://ca.example.com/acme/authz/r4HqLzrSrpI"
                ],
                "finalize": "https://ca.example.com/acme/order/TOlocE8rfgo/finalize"
            }"#,
        )
        .unwrap();

        assert_eq!(data.status, OrderStatus::Pending);
        assert_eq!(data.identifiers.len(), 2);
        assert_eq!(data.authorizations.len(), 2);
        assert!(data.certificate.is_none());
        // the two offset shapes name the same instant
        assert_eq!(data.not_before.unwrap().as_second() + 7 * 24 * 3600, data.not_after.unwrap().as_second());
    }

    #[test]
    fn auto_renewal_round_trips_star_field_names() {
        let options = AutoRenewalOptions {
            lifetime: Some(7 * 24 * 3600),
            allow_certificate_get: Some(true),
            ..AutoRenewalOptions::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["lifetime"], 604800);
        assert_eq!(json["allow-certificate-get"], true);
        assert!(json.get("start-date").is_none());
    }
}
