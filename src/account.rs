//! Account registration, lookup, modification, deactivation and key
//! rollover (RFC 8555 sections 7.3 and 7.1.2).

use crate::crypto::{AccountKey, KeyBinding, MacKey, jws};
use crate::directory::ResourceKind;
use crate::error::{AcmeError, Result};
use crate::resource::ResourceState;
use crate::session::{Login, Session};
use crate::types::AccountStatus;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use url::Url;

/// The account representation the server returns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    /// Account status
    #[serde(default)]
    pub status: AccountStatus,

    /// Whether the terms of service were agreed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    /// Contact URIs, in the order they were registered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,

    /// URL of the account's paginated orders list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<Url>,
}

/// An ACME account resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account {
    state: ResourceState<AccountData>,
}

impl Login {
    /// The account resource this login controls
    pub fn account(&self) -> Account {
        Account {
            state: ResourceState::bound(self, self.account_url().clone()),
        }
    }
}

impl Account {
    /// The account URL
    pub fn location(&self) -> &Url {
        self.state.location()
    }

    /// The login this account is bound to
    pub fn login(&self) -> Result<Login> {
        self.state.login().cloned()
    }

    /// Bind a deserialized account to a login; exactly once
    pub fn rebind(&mut self, login: &Login) -> Result<()> {
        self.state.rebind(login)
    }

    /// The cached account body, if loaded
    pub fn data(&self) -> Option<&AccountData> {
        self.state.body()
    }

    /// The cached account status
    pub fn status(&self) -> Option<AccountStatus> {
        self.data().map(|d| d.status)
    }

    /// Fetch the account, returning the server's `Retry-After` hint
    pub async fn fetch(&mut self) -> Result<Option<Timestamp>> {
        self.state.fetch().await
    }

    /// Load the account body if it has never been fetched
    pub async fn ensure_loaded(&mut self) -> Result<&AccountData> {
        self.state.ensure_loaded().await
    }

    /// All order URLs of this account, following the `rel="next"`
    /// pagination of the orders list
    pub async fn orders(&mut self) -> Result<Vec<Url>> {
        #[derive(Deserialize)]
        struct OrderList {
            #[serde(default)]
            orders: Vec<Url>,
        }

        let login = self.state.login()?.clone();
        let mut next = self.ensure_loaded().await?.orders.clone();
        let mut orders = Vec::new();
        while let Some(url) = next {
            let response = login.post_as_get(&url).await?;
            let page: OrderList = response.json()?;
            orders.extend(page.orders);
            next = response.links("next").next().cloned().filter(|n| *n != url);
        }
        Ok(orders)
    }

    /// Start editing the account. Only the fields touched on the editor
    /// are sent on commit.
    pub fn modify(&mut self) -> AccountEditor<'_> {
        let contacts = self.data().map(|d| d.contact.clone());
        AccountEditor { account: self, contacts, changed: false }
    }

    /// Deactivate the account. Terminal; the server will refuse any
    /// further request under this key.
    pub async fn deactivate(&mut self) -> Result<()> {
        let login = self.state.login()?.clone();
        let payload = json!({"status": "deactivated"});
        let response = login.post(self.location(), Some(&payload), None).await?;
        if response.has_json_body() {
            self.state.update_from(&response)?;
        }
        info!(account = %self.location(), "account deactivated");
        Ok(())
    }

    /// Roll the account over to a new key pair (RFC 8555 section 7.3.5).
    ///
    /// The inner JWS is signed by the new key, the outer request by the
    /// current one. On success the login's key pair is swapped
    /// atomically; a rollover to the identical private key is refused.
    pub async fn change_key(&mut self, new_key: AccountKey) -> Result<()> {
        let login = self.state.login()?.clone();
        let old_key = login.key();
        if new_key.pkcs8_der() == old_key.pkcs8_der() {
            return Err(AcmeError::invalid_input(
                "the new key is identical to the current account key",
            ));
        }

        let key_change_url = login
            .session()
            .resource_url(ResourceKind::KeyChange)
            .await?;
        let inner =
            jws::key_change_inner(&new_key, &old_key, login.account_url(), &key_change_url)?;
        let payload = serde_json::to_value(&inner)?;
        login.post(&key_change_url, Some(&payload), None).await?;
        login.swap_key(new_key);
        info!(account = %self.location(), "account key rolled over");
        Ok(())
    }
}

/// Editable draft of an account's mutable fields
pub struct AccountEditor<'a> {
    account: &'a mut Account,
    contacts: Option<Vec<String>>,
    changed: bool,
}

impl AccountEditor<'_> {
    /// Append a contact URI
    pub fn add_contact(mut self, uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        validate_contact(&uri)?;
        self.contacts.get_or_insert_default().push(uri);
        self.changed = true;
        Ok(self)
    }

    /// Append an email contact
    pub fn add_email(self, address: &str) -> Result<Self> {
        self.add_contact(format!("mailto:{address}"))
    }

    /// Remove all contacts
    pub fn clear_contacts(mut self) -> Self {
        self.contacts = Some(Vec::new());
        self.changed = true;
        self
    }

    /// Send the changed fields. A no-op if nothing was changed.
    pub async fn commit(self) -> Result<()> {
        if !self.changed {
            return Ok(());
        }
        let login = self.account.state.login()?.clone();
        let payload = json!({"contact": self.contacts.unwrap_or_default()});
        let response = login
            .post(self.account.location(), Some(&payload), None)
            .await?;
        if response.has_json_body() {
            self.account.state.update_from(&response)?;
        }
        Ok(())
    }
}

/// Builder for registering or looking up an account
#[derive(Default)]
pub struct AccountBuilder {
    contacts: Vec<String>,
    terms_agreed: bool,
    only_existing: bool,
    key: Option<AccountKey>,
    eab: Option<(String, MacKey)>,
}

impl AccountBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contact URI. `mailto:` URIs must name a single recipient
    /// and carry no hfields.
    pub fn contact(mut self, uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        validate_contact(&uri)?;
        if !self.contacts.contains(&uri) {
            self.contacts.push(uri);
        }
        Ok(self)
    }

    /// Add an email contact
    pub fn email(self, address: &str) -> Result<Self> {
        self.contact(format!("mailto:{address}"))
    }

    /// Agree to the CA's terms of service
    pub fn agree_to_terms(mut self) -> Self {
        self.terms_agreed = true;
        self
    }

    /// Only look up an existing account for the key; never register
    pub fn only_existing(mut self) -> Self {
        self.only_existing = true;
        self
    }

    /// The account key pair. Required.
    pub fn key(mut self, key: AccountKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Attach the CA-issued external account binding credentials
    pub fn external_account_binding(mut self, kid: impl Into<String>, mac_key: MacKey) -> Self {
        self.eab = Some((kid.into(), mac_key));
        self
    }

    /// Register the account, or fetch the existing one bound to the key.
    ///
    /// With `only_existing` set, a CA that knows no such account answers
    /// with the typed `accountDoesNotExist` error.
    pub async fn create(self, session: &Session) -> Result<Account> {
        let key = self
            .key
            .ok_or_else(|| AcmeError::invalid_input("an account key is required"))?;
        let new_account_url = session.resource_url(ResourceKind::NewAccount).await?;

        if self.eab.is_none()
            && !self.only_existing
            && session.metadata().await?.external_account_required
        {
            return Err(AcmeError::invalid_input(
                "this CA requires an external account binding",
            ));
        }

        let mut claims = serde_json::Map::new();
        if !self.contacts.is_empty() {
            claims.insert("contact".into(), json!(self.contacts));
        }
        if self.terms_agreed {
            claims.insert("termsOfServiceAgreed".into(), json!(true));
        }
        if self.only_existing {
            claims.insert("onlyReturnExisting".into(), json!(true));
        }
        if let Some((kid, mac_key)) = &self.eab {
            let binding = jws::external_account_binding(kid, mac_key, &key, &new_account_url)?;
            claims.insert("externalAccountBinding".into(), serde_json::to_value(binding)?);
        }

        let payload = Value::Object(claims);
        let response = session
            .send_signed(
                &new_account_url,
                &key,
                KeyBinding::EmbeddedJwk,
                Some(&payload),
                None,
            )
            .await?;

        let location = response.require_location()?;
        let login = Login::new(session.clone(), location.clone(), key);
        info!(account = %location, "account ready");

        let mut state = ResourceState::bound(&login, location);
        if response.has_json_body() {
            state.update_from(&response)?;
        }
        Ok(Account { state })
    }
}

/// Check a contact URI: `mailto:` must have exactly one recipient and no
/// hfields; other schemes pass through unmodified.
fn validate_contact(uri: &str) -> Result<()> {
    if let Some(address) = uri.strip_prefix("mailto:") {
        if address.is_empty() {
            return Err(AcmeError::invalid_input("empty mailto address"));
        }
        if address.contains(',') {
            return Err(AcmeError::invalid_input(format!(
                "mailto URI must have a single recipient: {uri:?}"
            )));
        }
        if address.contains('?') {
            return Err(AcmeError::invalid_input(format!(
                "mailto URI must not carry hfields: {uri:?}"
            )));
        }
    }
    Ok(())
}
