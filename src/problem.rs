/// RFC 7807 problem documents and the RFC 8555 error URN taxonomy
use crate::types::Identifier;
use serde::{Deserialize, Serialize};
use url::Url;

/// Namespace prefix of the ACME error URNs (RFC 8555 section 6.7)
pub const ACME_ERROR_URN_PREFIX: &str = "urn:ietf:params:acme:error:";

/// Machine-readable error document returned by the server (RFC 7807)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Problem {
    /// Error type URI, absolute after resolving against the document base URL
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,

    /// Short human-readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Human-readable explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// URI identifying the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Identifier this problem relates to, on sub-problems
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,

    /// Nested sub-problems, same schema
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subproblems: Vec<Problem>,
}

/// Typed classification of the ACME error URNs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// Stale or missing anti-replay nonce; retried once automatically
    BadNonce,
    /// The JWS was signed with an algorithm the server rejects
    BadSignatureAlgorithm,
    /// The account lacks authorization for the request
    Unauthorized,
    /// Too many requests; `Retry-After` tells when to come back
    RateLimited,
    /// The user must visit a URL (e.g. agree to updated terms)
    UserActionRequired,
    /// `onlyReturnExisting` was set and no account matched the key
    AccountDoesNotExist,
    /// The CA requires an external account binding
    ExternalAccountRequired,
    /// The CSR was rejected
    BadCsr,
    /// Finalization attempted while the order was not ready
    OrderNotReady,
    /// The certificate is already revoked
    AlreadyRevoked,
    /// Any other (or unknown) error URN
    Other,
}

impl Problem {
    /// Classify this problem by its ACME error URN
    pub fn kind(&self) -> ProblemKind {
        let Some(urn) = self.problem_type.as_deref() else {
            return ProblemKind::Other;
        };
        let Some(name) = urn.strip_prefix(ACME_ERROR_URN_PREFIX) else {
            return ProblemKind::Other;
        };
        match name {
            "badNonce" => ProblemKind::BadNonce,
            "badSignatureAlgorithm" => ProblemKind::BadSignatureAlgorithm,
            "unauthorized" => ProblemKind::Unauthorized,
            "rateLimited" => ProblemKind::RateLimited,
            "userActionRequired" => ProblemKind::UserActionRequired,
            "accountDoesNotExist" => ProblemKind::AccountDoesNotExist,
            "externalAccountRequired" => ProblemKind::ExternalAccountRequired,
            "badCSR" => ProblemKind::BadCsr,
            "orderNotReady" => ProblemKind::OrderNotReady,
            "alreadyRevoked" => ProblemKind::AlreadyRevoked,
            _ => ProblemKind::Other,
        }
    }

    /// Resolve the `type` and `instance` URIs against the document base URL.
    ///
    /// Relative URIs in problem documents are interpreted against the URL
    /// the document was retrieved from. Sub-problems are resolved too.
    pub fn resolve_uris(&mut self, base: &Url) {
        if let Some(t) = self.problem_type.as_deref()
            && let Ok(abs) = base.join(t)
        {
            self.problem_type = Some(abs.to_string());
        }
        if let Some(i) = self.instance.as_deref()
            && let Ok(abs) = base.join(i)
        {
            self.instance = Some(abs.to_string());
        }
        for sub in &mut self.subproblems {
            sub.resolve_uris(base);
        }
    }

    /// The user-visible message: `detail` first, `title` second, `type` last
    fn message(&self) -> &str {
        self.detail
            .as_deref()
            .or(self.title.as_deref())
            .or(self.problem_type.as_deref())
            .unwrap_or("unknown problem")
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())?;
        if !self.subproblems.is_empty() {
            let subs: Vec<&str> = self.subproblems.iter().map(Problem::message).collect();
            write!(f, " ({})", subs.join(" \u{2013} "))?;
        }
        Ok(())
    }
}
