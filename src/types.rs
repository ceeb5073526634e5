/// Common types and statuses of the ACME protocol
use crate::crypto::encoding::to_ace;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Identifier type for DNS names
pub const IDENTIFIER_DNS: &str = "dns";
/// Identifier type for IP addresses (RFC 8738)
pub const IDENTIFIER_IP: &str = "ip";

/// An object to be certified: a DNS name, an IP address, or a CA-defined type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    /// Identifier type, e.g. "dns" or "ip"
    #[serde(rename = "type")]
    pub kind: String,

    /// Identifier value: ACE-encoded domain name or IP literal
    pub value: String,

    /// Ancestor domain for subdomain authorizations (RFC 9444)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestor_domain: Option<String>,

    /// Whether authorization for a subdomain is acceptable (RFC 9444)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain_auth_allowed: Option<bool>,
}

impl Identifier {
    /// Create an identifier of an arbitrary CA-defined type
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            ancestor_domain: None,
            subdomain_auth_allowed: None,
        }
    }

    /// Create a DNS identifier. The domain is ACE-encoded.
    pub fn dns(domain: &str) -> Result<Self> {
        Ok(Self::new(IDENTIFIER_DNS, to_ace(domain)?))
    }

    /// Create an IP identifier
    pub fn ip(addr: std::net::IpAddr) -> Self {
        Self::new(IDENTIFIER_IP, addr.to_string())
    }

    /// Set the ancestor domain (RFC 9444). The domain is ACE-encoded.
    pub fn with_ancestor_domain(mut self, domain: &str) -> Result<Self> {
        self.ancestor_domain = Some(to_ace(domain)?);
        Ok(self)
    }

    /// Mark that an authorization for a subdomain is acceptable (RFC 9444)
    pub fn allow_subdomain_auth(mut self) -> Self {
        self.subdomain_auth_allowed = Some(true);
        self
    }

    /// Whether this is a DNS identifier
    pub fn is_dns(&self) -> bool {
        self.kind == IDENTIFIER_DNS
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}

/// Certificate revocation reason, the RFC 5280 CRL reason subset ACME accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RevocationReason {
    /// Reason unspecified
    Unspecified = 0,
    /// Key compromise
    KeyCompromise = 1,
    /// CA compromise
    CaCompromise = 2,
    /// Affiliation changed
    AffiliationChanged = 3,
    /// Superseded
    Superseded = 4,
    /// Cessation of operation
    CessationOfOperation = 5,
    /// Certificate hold
    CertificateHold = 6,
    /// Remove from CRL
    RemoveFromCrl = 8,
    /// Privilege withdrawn
    PrivilegeWithdrawn = 9,
    /// AA compromise
    AaCompromise = 10,
}

impl RevocationReason {
    /// Map a CRL reason code to the enum. Codes outside the ACME subset fail.
    pub fn from_code(code: u8) -> Result<Self> {
        Self::try_from(code).map_err(crate::error::AcmeError::invalid_input)
    }

    /// The numeric CRL reason code
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<RevocationReason> for u8 {
    fn from(reason: RevocationReason) -> u8 {
        reason as u8
    }
}

impl TryFrom<u8> for RevocationReason {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(RevocationReason::Unspecified),
            1 => Ok(RevocationReason::KeyCompromise),
            2 => Ok(RevocationReason::CaCompromise),
            3 => Ok(RevocationReason::AffiliationChanged),
            4 => Ok(RevocationReason::Superseded),
            5 => Ok(RevocationReason::CessationOfOperation),
            6 => Ok(RevocationReason::CertificateHold),
            8 => Ok(RevocationReason::RemoveFromCrl),
            9 => Ok(RevocationReason::PrivilegeWithdrawn),
            10 => Ok(RevocationReason::AaCompromise),
            _ => Err(format!("unknown revocation reason code: {code}")),
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account is usable
    Valid,
    /// Deactivated by the client; terminal
    Deactivated,
    /// Revoked by the server; terminal
    Revoked,
    /// Status not reported or not recognized
    #[serde(other)]
    #[default]
    Unknown,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Waiting for authorizations
    Pending,
    /// All authorizations valid; may be finalized
    Ready,
    /// Finalization submitted, certificate not yet issued
    Processing,
    /// Certificate issued
    Valid,
    /// Order failed; terminal
    Invalid,
}

/// Authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    /// Waiting for a challenge to complete
    Pending,
    /// Identifier control proven
    Valid,
    /// A challenge failed; terminal
    Invalid,
    /// Deactivated by the client
    Deactivated,
    /// Validity period elapsed
    Expired,
    /// Revoked by the server
    Revoked,
}

/// Challenge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Not yet triggered
    Pending,
    /// Triggered, server is validating
    Processing,
    /// Validation succeeded
    Valid,
    /// Validation failed; terminal
    Invalid,
}

macro_rules! status_display {
    ($($ty:ty),+) => {$(
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
                write!(f, "{}", json.trim_matches('"'))
            }
        }
    )+};
}

status_display!(AccountStatus, OrderStatus, AuthorizationStatus, ChallengeStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_dns_is_ace_encoded() {
        let id = Identifier::dns("Bücher.example").unwrap();
        assert_eq!(id.kind, "dns");
        assert_eq!(id.value, "xn--bcher-kva.example");
    }

    #[test]
    fn identifier_ip() {
        let id = Identifier::ip("192.0.2.1".parse().unwrap());
        assert_eq!(id.kind, "ip");
        assert_eq!(id.value, "192.0.2.1");
    }

    #[test]
    fn identifier_serializes_rfc9444_fields() {
        let id = Identifier::dns("sub.example.com")
            .unwrap()
            .with_ancestor_domain("example.com")
            .unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["type"], "dns");
        assert_eq!(json["ancestorDomain"], "example.com");
        assert!(json.get("subdomainAuthAllowed").is_none());
    }

    #[test]
    fn revocation_reason_mapping() {
        assert_eq!(
            RevocationReason::from_code(1).unwrap(),
            RevocationReason::KeyCompromise
        );
        assert_eq!(RevocationReason::KeyCompromise.code(), 1);
        assert!(RevocationReason::from_code(7).is_err());
        assert!(RevocationReason::from_code(11).is_err());
    }

    #[test]
    fn statuses_parse_from_wire() {
        let status: OrderStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(status, OrderStatus::Ready);
        assert_eq!(status.to_string(), "ready");

        let status: AccountStatus = serde_json::from_str("\"surprise\"").unwrap();
        assert_eq!(status, AccountStatus::Unknown);
    }
}
