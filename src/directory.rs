/// ACME directory and its metadata (RFC 8555 section 7.1.1)
use serde::{Deserialize, Serialize};
use url::Url;

/// The resource kinds a directory can map to endpoint URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Nonce endpoint, targeted with HEAD
    NewNonce,
    /// Account creation/lookup
    NewAccount,
    /// Order creation
    NewOrder,
    /// Pre-authorization (optional)
    NewAuthz,
    /// Certificate revocation
    RevokeCert,
    /// Account key rollover
    KeyChange,
    /// ACME Renewal Information (draft)
    RenewalInfo,
}

impl ResourceKind {
    /// The directory field name
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::NewNonce => "newNonce",
            ResourceKind::NewAccount => "newAccount",
            ResourceKind::NewOrder => "newOrder",
            ResourceKind::NewAuthz => "newAuthz",
            ResourceKind::RevokeCert => "revokeCert",
            ResourceKind::KeyChange => "keyChange",
            ResourceKind::RenewalInfo => "renewalInfo",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The directory document: resource kind → absolute endpoint URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// New nonce endpoint
    pub new_nonce: Url,

    /// New account endpoint
    pub new_account: Url,

    /// New order endpoint
    pub new_order: Url,

    /// Pre-authorization endpoint, absent on most CAs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_authz: Option<Url>,

    /// Revocation endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<Url>,

    /// Key rollover endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_change: Option<Url>,

    /// Renewal information endpoint (draft ARI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<Url>,

    /// Directory metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

impl Directory {
    /// The endpoint URL for a resource kind, if the CA provides it
    pub fn url_for(&self, kind: ResourceKind) -> Option<&Url> {
        match kind {
            ResourceKind::NewNonce => Some(&self.new_nonce),
            ResourceKind::NewAccount => Some(&self.new_account),
            ResourceKind::NewOrder => Some(&self.new_order),
            ResourceKind::NewAuthz => self.new_authz.as_ref(),
            ResourceKind::RevokeCert => self.revoke_cert.as_ref(),
            ResourceKind::KeyChange => self.key_change.as_ref(),
            ResourceKind::RenewalInfo => self.renewal_info.as_ref(),
        }
    }
}

/// Immutable snapshot of the directory `meta` object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Terms of service URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<Url>,

    /// CA website
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<Url>,

    /// CAA identities the CA recognizes for itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caa_identities: Vec<String>,

    /// Whether account creation requires an external account binding
    #[serde(default)]
    pub external_account_required: bool,

    /// Certificate profiles offered by the CA, name → description
    #[cfg(feature = "profiles")]
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub profiles: std::collections::BTreeMap<String, String>,

    /// Short-term automatic renewal support (RFC 8739)
    #[serde(rename = "auto-renewal", skip_serializing_if = "Option::is_none")]
    pub auto_renewal: Option<AutoRenewalMeta>,
}

impl Metadata {
    /// Whether the CA offers the named certificate profile
    #[cfg(feature = "profiles")]
    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }
}

/// The `meta.auto-renewal` sub-object (RFC 8739 section 3.4)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoRenewalMeta {
    /// Minimum acceptable certificate lifetime, in seconds
    #[serde(rename = "min-lifetime", skip_serializing_if = "Option::is_none")]
    pub min_lifetime: Option<u64>,

    /// Maximum delta between auto-renewal start and end dates, in seconds
    #[serde(rename = "max-duration", skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u64>,

    /// Whether unauthenticated certificate GET is offered
    #[serde(rename = "allow-certificate-get", default)]
    pub allow_certificate_get: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_directory() {
        let json = r#"{
            "newNonce": "https://ca.example.com/acme/new-nonce",
            "newAccount": "https://ca.example.com/acme/new-account",
            "newOrder": "https://ca.example.com/acme/new-order"
        }"#;

        let dir: Directory = serde_json::from_str(json).unwrap();
        assert_eq!(
            dir.url_for(ResourceKind::NewNonce).unwrap().as_str(),
            "https://ca.example.com/acme/new-nonce"
        );
        assert!(dir.url_for(ResourceKind::RevokeCert).is_none());
        assert!(dir.url_for(ResourceKind::RenewalInfo).is_none());
    }

    #[test]
    fn parses_metadata() {
        let json = r#"{
            "newNonce": "https://ca.example.com/acme/new-nonce",
            "newAccount": "https://ca.example.com/acme/new-account",
            "newOrder": "https://ca.example.com/acme/new-order",
            "revokeCert": "https://ca.example.com/acme/revoke-cert",
            "keyChange": "https://ca.example.com/acme/key-change",
            "renewalInfo": "https://ca.example.com/acme/renewal-info",
            "meta": {
                "termsOfService": "https://ca.example.com/tos.pdf",
                "website": "https://ca.example.com",
                "caaIdentities": ["ca.example.com"],
                "externalAccountRequired": true,
                "auto-renewal": {
                    "min-lifetime": 3600,
                    "max-duration": 31536000,
                    "allow-certificate-get": true
                }
            }
        }"#;

        let dir: Directory = serde_json::from_str(json).unwrap();
        let meta = dir.meta.unwrap();
        assert!(meta.external_account_required);
        assert_eq!(meta.caa_identities, vec!["ca.example.com"]);
        let ar = meta.auto_renewal.unwrap();
        assert_eq!(ar.min_lifetime, Some(3600));
        assert!(ar.allow_certificate_get);
    }

    #[test]
    fn rejects_relative_urls() {
        let json = r#"{
            "newNonce": "/acme/new-nonce",
            "newAccount": "https://ca.example.com/acme/new-account",
            "newOrder": "https://ca.example.com/acme/new-order"
        }"#;
        assert!(serde_json::from_str::<Directory>(json).is_err());
    }

    #[cfg(feature = "profiles")]
    #[test]
    fn parses_profiles() {
        let json = r#"{
            "newNonce": "https://ca.example.com/acme/new-nonce",
            "newAccount": "https://ca.example.com/acme/new-account",
            "newOrder": "https://ca.example.com/acme/new-order",
            "meta": {
                "profiles": {
                    "classic": "The default profile",
                    "shortlived": "A six-day certificate"
                }
            }
        }"#;

        let dir: Directory = serde_json::from_str(json).unwrap();
        let meta = dir.meta.unwrap();
        assert!(meta.has_profile("classic"));
        assert!(!meta.has_profile("tlsserver"));
    }
}
