//! Session and login: the shared, internally synchronized state a client
//! keeps per CA (directory cache, nonce slot, network settings) and per
//! account (account URL plus key pair).

use crate::clock::{Clock, SystemClock};
use crate::crypto::{AccountKey, KeyBinding, jws};
use crate::directory::{Directory, Metadata, ResourceKind};
use crate::error::{AcmeError, Result};
use crate::problem::ProblemKind;
use crate::transport::{AcmeResponse, Transport};
use jiff::Timestamp;
use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Directory cache lifetime when the server does not say otherwise
const DIRECTORY_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("acmekit/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Session`]
pub struct SessionBuilder {
    directory_url: String,
    locale: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: String,
    clock: Arc<dyn Clock>,
}

impl SessionBuilder {
    fn new(directory_url: &str) -> Self {
        Self {
            directory_url: directory_url.to_owned(),
            locale: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: USER_AGENT.to_owned(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Language tag sent as `Accept-Language`, e.g. `"de-DE"`
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Connect timeout, default 10 s
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read timeout, default 10 s
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the `User-Agent` header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Inject a clock; tests pass a [`crate::clock::ManualClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the session
    pub fn build(self) -> Result<Session> {
        let directory_url = Url::parse(&self.directory_url).map_err(|e| {
            AcmeError::invalid_input(format!("invalid directory URL {:?}: {e}", self.directory_url))
        })?;
        let transport = Transport::new(
            self.connect_timeout,
            self.read_timeout,
            &self.user_agent,
            accept_language(self.locale.as_deref()),
            self.clock.clone(),
        )?;
        Ok(Session {
            inner: Arc::new(SessionInner {
                directory_url,
                transport,
                clock: self.clock,
                directory: tokio::sync::Mutex::new(DirectoryCache::default()),
                nonce: Mutex::new(None),
            }),
        })
    }
}

#[derive(Default)]
struct DirectoryCache {
    directory: Option<Directory>,
    expires_at: Option<Timestamp>,
    last_modified: Option<String>,
}

struct SessionInner {
    directory_url: Url,
    transport: Transport,
    clock: Arc<dyn Clock>,
    directory: tokio::sync::Mutex<DirectoryCache>,
    /// Single-slot LIFO nonce pool; a fresh server nonce replaces the
    /// cached one
    nonce: Mutex<Option<String>>,
}

/// A connection to one ACME CA. Cheap to clone; all shared state is
/// internally synchronized, so one session may serve many tasks.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start building a session for the CA at the given directory URL
    pub fn builder(directory_url: &str) -> SessionBuilder {
        SessionBuilder::new(directory_url)
    }

    /// Build a session with default settings
    pub fn new(directory_url: &str) -> Result<Self> {
        Self::builder(directory_url).build()
    }

    /// The directory URL this session talks to
    pub fn directory_url(&self) -> &Url {
        &self.inner.directory_url
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// The CA's directory. Fetched on first use and refreshed after its
    /// lifetime elapses; a 304 on the conditional refresh keeps the cache.
    /// Concurrent first reads serialize on a single in-flight fetch.
    pub async fn directory(&self) -> Result<Directory> {
        let mut cache = self.inner.directory.lock().await;
        let now = self.inner.clock.now();
        if let Some(directory) = &cache.directory
            && cache.expires_at.is_some_and(|expiry| now < expiry)
        {
            return Ok(directory.clone());
        }

        let if_modified_since = cache
            .directory
            .is_some()
            .then(|| cache.last_modified.clone())
            .flatten();
        let response = self
            .inner
            .transport
            .get(&self.inner.directory_url, if_modified_since.as_deref())
            .await?;

        if response.status == 304 {
            if let Some(directory) = cache.directory.clone() {
                cache.expires_at = Some(cache_expiry(&response, now));
                debug!("directory unchanged; keeping cache");
                return Ok(directory);
            }
            return Err(AcmeError::protocol("304 for an unconditional directory request"));
        }

        let response = response.error_for_status()?;
        let directory: Directory = response.json()?;
        cache.expires_at = Some(cache_expiry(&response, now));
        cache.last_modified = response.last_modified.clone();
        cache.directory = Some(directory.clone());
        info!(url = %self.inner.directory_url, "ACME directory refreshed");
        Ok(directory)
    }

    /// The directory metadata, empty if the CA publishes none
    pub async fn metadata(&self) -> Result<Metadata> {
        Ok(self.directory().await?.meta.unwrap_or_default())
    }

    /// The endpoint URL for a resource kind. `Unsupported` when the CA's
    /// directory does not list it.
    pub async fn resource_url(&self, kind: ResourceKind) -> Result<Url> {
        self.directory().await?.url_for(kind).cloned().ok_or_else(|| {
            AcmeError::unsupported(format!("{kind} is not listed in the CA's directory"))
        })
    }

    fn take_nonce(&self) -> Option<String> {
        self.inner
            .nonce
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    pub(crate) fn stash_nonce_from(&self, response: &AcmeResponse) {
        if let Some(nonce) = &response.replay_nonce {
            let mut slot = self
                .inner
                .nonce
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if slot.replace(nonce.clone()).is_some() {
                debug!("replacing cached nonce");
            }
        }
    }

    async fn fetch_nonce(&self) -> Result<String> {
        let url = self.resource_url(ResourceKind::NewNonce).await?;
        let response = self.inner.transport.head(&url).await?.error_for_status()?;
        response
            .replay_nonce
            .clone()
            .ok_or_else(|| AcmeError::protocol("newNonce response carried no usable Replay-Nonce"))
    }

    /// Send a signed request. Each attempt consumes one nonce and each
    /// response surrenders at most one into the pool; a `badNonce`
    /// rejection is retried exactly once with the nonce the error
    /// response supplied.
    pub(crate) async fn send_signed(
        &self,
        url: &Url,
        key: &AccountKey,
        binding: KeyBinding<'_>,
        payload: Option<&Value>,
        accept: Option<&str>,
    ) -> Result<AcmeResponse> {
        let mut retried = false;
        loop {
            let nonce = match self.take_nonce() {
                Some(nonce) => nonce,
                None => self.fetch_nonce().await?,
            };
            let jws = jws::sign_request(url, key, binding, Some(&nonce), payload)?;
            let response = self.inner.transport.post_jose(url, &jws, accept).await?;
            self.stash_nonce_from(&response);
            match response.error_for_status() {
                Ok(response) => return Ok(response),
                Err(err) if !retried && err.problem_kind() == Some(ProblemKind::BadNonce) => {
                    debug!(%url, "stale nonce rejected; retrying once");
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("directory_url", &self.inner.directory_url.as_str())
            .finish_non_exhaustive()
    }
}

fn cache_expiry(response: &AcmeResponse, now: Timestamp) -> Timestamp {
    let default_expiry = now
        .checked_add(jiff::SignedDuration::try_from(DIRECTORY_TTL).unwrap_or_default())
        .unwrap_or(Timestamp::MAX);
    if let Some(max_age) = response.max_age {
        let secs = i64::try_from(max_age).unwrap_or(i64::MAX);
        now.checked_add(jiff::SignedDuration::from_secs(secs))
            .unwrap_or(Timestamp::MAX)
    } else if let Some(expires) = response.expires {
        expires
    } else {
        default_expiry
    }
}

/// Weighted `Accept-Language` from a locale tag, with a wildcard tail
fn accept_language(locale: Option<&str>) -> String {
    match locale {
        None => "*".to_owned(),
        Some(tag) => match tag.split_once('-') {
            Some((base, _)) => format!("{tag},{base};q=0.8,*;q=0.1"),
            None => format!("{tag},*;q=0.1"),
        },
    }
}

struct LoginInner {
    session: Session,
    account_url: Url,
    key: RwLock<Arc<AccountKey>>,
}

/// The binding of a [`Session`] to one account: its URL plus its key
/// pair. Cheap to clone; several logins may share a session.
///
/// Not serializable. To come back later, persist the account URL and the
/// key material and rebuild the login from them.
#[derive(Clone)]
pub struct Login {
    inner: Arc<LoginInner>,
}

impl Login {
    /// Bind an account URL and key pair to a session
    pub fn new(session: Session, account_url: Url, key: AccountKey) -> Self {
        Self {
            inner: Arc::new(LoginInner {
                session,
                account_url,
                key: RwLock::new(Arc::new(key)),
            }),
        }
    }

    /// The session this login works on
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// The account URL, used as the JWS `kid`
    pub fn account_url(&self) -> &Url {
        &self.inner.account_url
    }

    /// The current account key
    pub fn key(&self) -> Arc<AccountKey> {
        self.inner
            .key
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// The RFC 7638 thumbprint of the current account key
    pub fn key_thumbprint(&self) -> String {
        self.key().thumbprint()
    }

    /// Atomically replace the key pair after a successful rollover
    pub(crate) fn swap_key(&self, new_key: AccountKey) {
        *self
            .inner
            .key
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(new_key);
    }

    /// Signed POST under this account's `kid`
    pub(crate) async fn post(
        &self,
        url: &Url,
        payload: Option<&Value>,
        accept: Option<&str>,
    ) -> Result<AcmeResponse> {
        let key = self.key();
        self.session()
            .send_signed(
                url,
                &key,
                KeyBinding::KeyId(self.account_url().as_str()),
                payload,
                accept,
            )
            .await
    }

    /// POST-as-GET: authenticated read with the empty-string payload
    pub(crate) async fn post_as_get(&self, url: &Url) -> Result<AcmeResponse> {
        self.post(url, None, None).await
    }
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("account_url", &self.inner.account_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_language_shapes() {
        assert_eq!(accept_language(None), "*");
        assert_eq!(accept_language(Some("de")), "de,*;q=0.1");
        assert_eq!(accept_language(Some("de-DE")), "de-DE,de;q=0.8,*;q=0.1");
    }

    #[test]
    fn login_key_swap_is_visible_through_clones() {
        let session = Session::new("https://ca.example.com/directory").unwrap();
        let key = AccountKey::generate_p256().unwrap();
        let old_thumb = key.thumbprint();
        let login = Login::new(
            session,
            Url::parse("https://ca.example.com/acct/1").unwrap(),
            key,
        );
        let clone = login.clone();

        let new_key = AccountKey::generate_p256().unwrap();
        let new_thumb = new_key.thumbprint();
        login.swap_key(new_key);

        assert_eq!(clone.key_thumbprint(), new_thumb);
        assert_ne!(clone.key_thumbprint(), old_thumb);
    }
}
