//! # acmekit - ACME v2 client protocol engine
//!
//! A Rust library for the stateful side of ACME (RFC 8555): JWS-signed
//! transport with nonce handling, the resource lifecycle (accounts,
//! orders, authorizations, challenges, certificates), directory and
//! metadata caching, Retry-After-aware polling, and renewal information.
//!
//! Placing challenge responses (files, DNS records, ALPN certificates),
//! generating keys and CSRs, and storing any of it is left to the caller;
//! the engine computes the proof material and drives the protocol.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use acmekit::prelude::*;
//! use std::time::Duration;
//!
//! # async fn run() -> acmekit::Result<()> {
//! let session = Session::new("https://acme-staging-v02.api.letsencrypt.org/directory")?;
//!
//! let account = AccountBuilder::new()
//!     .email("admin@example.com")?
//!     .agree_to_terms()
//!     .key(AccountKey::generate_p256()?)
//!     .create(&session)
//!     .await?;
//! let login = account.login()?;
//!
//! let mut order = login.new_order().domain("example.com")?.create().await?;
//! for mut authz in order.authorizations().await? {
//!     if let Some(mut challenge) = authz.find_challenge(Challenge::HTTP_01).await? {
//!         // serve challenge.key_authorization()? under challenge.http01_resource_path()?,
//!         // then:
//!         challenge.trigger().await?;
//!         challenge
//!             .wait_for_status(
//!                 &[ChallengeStatus::Valid, ChallengeStatus::Invalid],
//!                 Duration::from_secs(60),
//!                 None,
//!             )
//!             .await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod authorization;
pub mod certificate;
pub mod challenge;
pub mod clock;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod order;
pub mod poll;
pub mod problem;
#[cfg(feature = "ari")]
pub mod renewal;
pub mod resource;
pub mod session;
pub mod timefmt;
pub mod types;

mod transport;

// Re-exports for convenience
pub use account::{Account, AccountBuilder, AccountData, AccountEditor};
pub use authorization::{Authorization, AuthorizationData};
pub use certificate::Certificate;
pub use challenge::{Challenge, ChallengeData};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{AccountKey, Jws, JwsAlgorithm, MacKey};
pub use directory::{AutoRenewalMeta, Directory, Metadata, ResourceKind};
pub use error::{AcmeError, Result};
pub use order::{AutoRenewalOptions, Order, OrderBuilder, OrderData};
pub use poll::{CancelHandle, CancelSignal, Pollable, cancellation, wait_for_status};
pub use problem::{Problem, ProblemKind};
#[cfg(feature = "ari")]
pub use renewal::{RenewalInfo, RenewalInfoData, SuggestedWindow};
pub use resource::ResourceState;
pub use session::{Login, Session, SessionBuilder};
pub use types::{
    AccountStatus, AuthorizationStatus, ChallengeStatus, Identifier, OrderStatus,
    RevocationReason,
};

/// Prelude module with commonly used types
pub mod prelude {
    #[cfg(feature = "ari")]
    pub use crate::renewal::{RenewalInfo, SuggestedWindow};
    pub use crate::{
        Account, AccountBuilder, AccountKey, AcmeError, Authorization, Certificate, Challenge,
        Identifier, Login, MacKey, Order, OrderBuilder, Problem, ProblemKind, Result, Session,
        cancellation,
        types::{
            AccountStatus, AuthorizationStatus, ChallengeStatus, OrderStatus, RevocationReason,
        },
    };
}
