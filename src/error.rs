/// Error handling for the ACME client
use crate::problem::{Problem, ProblemKind};
use jiff::Timestamp;
use thiserror::Error;

/// Result type for ACME operations
pub type Result<T> = std::result::Result<T, AcmeError>;

/// Error types for ACME operations
#[derive(Error, Debug)]
pub enum AcmeError {
    /// Malformed server response, missing required header or field,
    /// unresolvable URL. Never retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error document returned by the ACME server (RFC 7807).
    ///
    /// `retry_after` is set when the server supplied a `Retry-After`
    /// header, e.g. on `rateLimited` responses.
    #[error("{problem}")]
    Server {
        /// The problem document sent by the server
        problem: Problem,
        /// Absolute instant derived from the `Retry-After` header
        retry_after: Option<Timestamp>,
    },

    /// The CA does not support the requested feature
    #[error("Not supported by the CA: {0}")]
    Unsupported(String),

    /// Key shape not usable for JWS signing
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    /// Invalid input provided by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Implicit fetch on first resource access failed
    #[error("Resource load failed: {0}")]
    LazyLoad(#[source] Box<AcmeError>),

    /// Polling deadline exceeded
    #[error("Polling deadline exceeded")]
    Timeout,

    /// Cancelled by the caller's signal
    #[error("Operation cancelled")]
    Cancelled,

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcmeError {
    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        AcmeError::Protocol(msg.into())
    }

    /// Create an unsupported-feature error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        AcmeError::Unsupported(msg.into())
    }

    /// Create an unsupported-key error
    pub fn unsupported_key<S: Into<String>>(msg: S) -> Self {
        AcmeError::UnsupportedKey(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        AcmeError::InvalidInput(msg.into())
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        AcmeError::Crypto(msg.into())
    }

    /// Wrap a fetch failure that happened during an implicit load
    pub fn lazy_load(inner: AcmeError) -> Self {
        AcmeError::LazyLoad(Box::new(inner))
    }

    /// The server problem document, if this is a server error
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            AcmeError::Server { problem, .. } => Some(problem),
            _ => None,
        }
    }

    /// The typed kind of the server problem, if this is a server error
    pub fn problem_kind(&self) -> Option<ProblemKind> {
        self.problem().map(Problem::kind)
    }

    /// The `Retry-After` instant attached to a server error, if any
    pub fn retry_after(&self) -> Option<Timestamp> {
        match self {
            AcmeError::Server { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
