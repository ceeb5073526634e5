//! Authorizations: the server's record of identifier control
//! (RFC 8555 section 7.5).

use crate::challenge::{Challenge, ChallengeData};
use crate::clock::Clock;
use crate::error::{AcmeError, Result};
use crate::poll::{self, CancelSignal, Pollable};
use crate::resource::ResourceState;
use crate::session::Login;
use crate::types::{AuthorizationStatus, Identifier};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// The authorization representation the server returns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationData {
    /// The identifier this authorization covers
    pub identifier: Identifier,

    /// Authorization status
    pub status: AuthorizationStatus,

    /// When the authorization expires
    #[serde(default, with = "crate::timefmt::ts_option", skip_serializing_if = "Option::is_none")]
    pub expires: Option<Timestamp>,

    /// Whether the order asked for a wildcard of this identifier
    #[serde(default)]
    pub wildcard: bool,

    /// The challenges offered; completing any one validates the
    /// authorization
    #[serde(default)]
    pub challenges: Vec<ChallengeData>,
}

/// An ACME authorization resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authorization {
    state: ResourceState<AuthorizationData>,
}

impl Login {
    /// Bind an authorization resource at a known URL
    pub fn bind_authorization(&self, url: Url) -> Authorization {
        Authorization {
            state: ResourceState::bound(self, url),
        }
    }
}

impl Authorization {
    /// The authorization URL
    pub fn location(&self) -> &Url {
        self.state.location()
    }

    /// Bind a deserialized authorization to a login; exactly once
    pub fn rebind(&mut self, login: &Login) -> Result<()> {
        self.state.rebind(login)
    }

    /// The cached authorization body, if loaded
    pub fn data(&self) -> Option<&AuthorizationData> {
        self.state.body()
    }

    /// The cached authorization status
    pub fn status(&self) -> Option<AuthorizationStatus> {
        self.data().map(|d| d.status)
    }

    /// Fetch the authorization, returning the server's `Retry-After` hint
    pub async fn fetch(&mut self) -> Result<Option<Timestamp>> {
        self.state.fetch().await
    }

    /// Load the authorization body if it has never been fetched
    pub async fn ensure_loaded(&mut self) -> Result<&AuthorizationData> {
        self.state.ensure_loaded().await
    }

    /// The challenges the server offers for this authorization
    pub async fn challenges(&mut self) -> Result<Vec<Challenge>> {
        let login = self.state.login()?.clone();
        let data = self.ensure_loaded().await?;
        Ok(data
            .challenges
            .iter()
            .map(|challenge| Challenge::from_data(&login, challenge.clone()))
            .collect())
    }

    /// The challenge of the given type, e.g. `"http-01"`. At most one may
    /// exist; several of the same type is a protocol violation by the
    /// server.
    pub async fn find_challenge(&mut self, kind: &str) -> Result<Option<Challenge>> {
        let mut found = None;
        for challenge in self.challenges().await? {
            if challenge.kind() == Some(kind) {
                if found.is_some() {
                    return Err(AcmeError::protocol(format!(
                        "server offered more than one {kind} challenge"
                    )));
                }
                found = Some(challenge);
            }
        }
        Ok(found)
    }

    /// Relinquish the authorization (RFC 8555 section 7.5.2)
    pub async fn deactivate(&mut self) -> Result<()> {
        let login = self.state.login()?.clone();
        let payload = json!({"status": "deactivated"});
        let response = login.post(self.location(), Some(&payload), None).await?;
        if response.has_json_body() {
            self.state.update_from(&response)?;
        }
        info!(authorization = %self.location(), "authorization deactivated");
        Ok(())
    }

    /// Poll until the authorization reaches one of the terminal statuses
    pub async fn wait_for_status(
        &mut self,
        terminal: &[AuthorizationStatus],
        timeout: Duration,
        cancel: Option<&CancelSignal>,
    ) -> Result<AuthorizationStatus> {
        poll::wait_for_status(self, terminal, timeout, cancel).await
    }
}

impl Pollable for Authorization {
    type Status = AuthorizationStatus;

    fn current_status(&self) -> Option<AuthorizationStatus> {
        self.status()
    }

    fn poll_clock(&self) -> Result<Arc<dyn Clock>> {
        Ok(self.state.login()?.session().clock())
    }

    async fn refresh(&mut self) -> Result<Option<Timestamp>> {
        self.state.fetch().await
    }
}
