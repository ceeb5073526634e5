//! Common state shared by every server-side resource: location URL,
//! login binding, cached JSON body and the last `Retry-After` hint.
//! Resource types carry this by composition.

use crate::error::{AcmeError, Result};
use crate::session::Login;
use crate::transport::AcmeResponse;
use jiff::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// Location, login binding and cached body of one ACME resource.
///
/// Serializes without the login; a deserialized resource must be
/// [re-bound](Self::rebind) exactly once before it can talk to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "B: Deserialize<'de>"))]
pub struct ResourceState<B> {
    location: Url,

    #[serde(skip)]
    login: Option<Login>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<B>,

    #[serde(skip)]
    retry_after: Option<Timestamp>,
}

impl<B> ResourceState<B> {
    pub(crate) fn bound(login: &Login, location: Url) -> Self {
        Self {
            location,
            login: Some(login.clone()),
            body: None,
            retry_after: None,
        }
    }

    pub(crate) fn with_body(login: &Login, location: Url, body: B) -> Self {
        Self {
            location,
            login: Some(login.clone()),
            body: Some(body),
            retry_after: None,
        }
    }

    /// The resource URL
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// The `Retry-After` instant of the most recent fetch, if the server
    /// sent one
    pub fn retry_after(&self) -> Option<Timestamp> {
        self.retry_after
    }

    /// Whether this resource is bound to a login
    pub fn is_bound(&self) -> bool {
        self.login.is_some()
    }

    /// Bind a deserialized resource to a login. Fails, without touching
    /// the state, if the resource is already bound.
    pub fn rebind(&mut self, login: &Login) -> Result<()> {
        if self.login.is_some() {
            return Err(AcmeError::invalid_input("resource is already bound to a login"));
        }
        self.login = Some(login.clone());
        Ok(())
    }

    pub(crate) fn login(&self) -> Result<&Login> {
        self.login
            .as_ref()
            .ok_or_else(|| AcmeError::protocol("resource is not bound to a login"))
    }

    /// The cached body, if loaded
    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    pub(crate) fn require_body(&self) -> Result<&B> {
        self.body
            .as_ref()
            .ok_or_else(|| AcmeError::protocol("resource body is not loaded"))
    }

    pub(crate) fn set_body(&mut self, body: B) {
        self.body = Some(body);
    }

    /// Drop the cached body so the next read fetches a fresh one
    pub(crate) fn invalidate(&mut self) {
        self.body = None;
    }
}

impl<B: DeserializeOwned> ResourceState<B> {
    /// POST-as-GET the resource. The body is updated and the server's
    /// `Retry-After` hint is returned, never raised as an error.
    pub(crate) async fn fetch(&mut self) -> Result<Option<Timestamp>> {
        let login = self.login()?.clone();
        let response = login.post_as_get(&self.location).await?;
        self.update_from(&response)?;
        Ok(response.retry_after)
    }

    /// Load the body if it has never been fetched. Failures of this
    /// implicit load are wrapped as `LazyLoad`.
    pub(crate) async fn ensure_loaded(&mut self) -> Result<&B> {
        if self.body.is_none() {
            self.fetch().await.map_err(AcmeError::lazy_load)?;
        }
        self.require_body()
    }

    /// Refresh the cached body and hints from a response that carried the
    /// resource representation
    pub(crate) fn update_from(&mut self, response: &AcmeResponse) -> Result<()> {
        self.retry_after = response.retry_after;
        self.body = Some(response.json()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountKey;
    use crate::session::Session;

    fn test_login() -> Login {
        Login::new(
            Session::new("https://ca.example.com/directory").unwrap(),
            Url::parse("https://ca.example.com/acct/1").unwrap(),
            AccountKey::generate_p256().unwrap(),
        )
    }

    #[test]
    fn serializes_without_login() {
        let login = test_login();
        let state: ResourceState<serde_json::Value> = ResourceState::with_body(
            &login,
            Url::parse("https://ca.example.com/order/7").unwrap(),
            serde_json::json!({"status": "pending"}),
        );

        let json = serde_json::to_string(&state).unwrap();
        let restored: ResourceState<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert!(!restored.is_bound());
        assert_eq!(restored.location(), state.location());
        assert_eq!(restored.body(), state.body());
    }

    #[test]
    fn rebind_is_exactly_once() {
        let login = test_login();
        let state: ResourceState<serde_json::Value> = ResourceState::bound(
            &login,
            Url::parse("https://ca.example.com/order/7").unwrap(),
        );
        let json = serde_json::to_string(&state).unwrap();
        let mut restored: ResourceState<serde_json::Value> = serde_json::from_str(&json).unwrap();

        assert!(restored.login().is_err());
        restored.rebind(&login).unwrap();
        assert!(restored.login().is_ok());

        let other = test_login();
        assert!(restored.rebind(&other).is_err());
        // the failed rebind did not replace the binding
        assert_eq!(
            restored.login().unwrap().account_url(),
            login.account_url()
        );
    }
}
