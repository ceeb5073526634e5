#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;

pub struct MockAcmeServer {
    pub server: mockito::ServerGuard,
}

impl MockAcmeServer {
    pub async fn new() -> Self {
        let server = mockito::Server::new_async().await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn directory_url(&self) -> String {
        format!("{}/directory", self.url())
    }

    pub async fn session(&self) -> acmekit::Session {
        acmekit::Session::new(&self.directory_url()).expect("session builds")
    }

    pub async fn mock_directory(&mut self) -> mockito::Mock {
        let url = self.url();
        self.server
            .mock("GET", "/directory")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "newNonce": format!("{url}/new-nonce"),
                    "newAccount": format!("{url}/new-account"),
                    "newOrder": format!("{url}/new-order"),
                    "revokeCert": format!("{url}/revoke-cert"),
                    "keyChange": format!("{url}/key-change"),
                    "renewalInfo": format!("{url}/renewal-info"),
                    "meta": {
                        "termsOfService": format!("{url}/tos"),
                        "website": "https://ca.example.com",
                        "caaIdentities": ["ca.example.com"],
                        "auto-renewal": {
                            "min-lifetime": 3600,
                            "max-duration": 31536000,
                            "allow-certificate-get": true
                        },
                        "profiles": {
                            "classic": "The default profile"
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_new_nonce(&mut self, nonce: &str) -> mockito::Mock {
        self.server
            .mock("HEAD", "/new-nonce")
            .with_status(200)
            .with_header("replay-nonce", nonce)
            .create_async()
            .await
    }

    pub async fn mock_new_account(&mut self) -> mockito::Mock {
        let url = self.url();
        self.server
            .mock("POST", "/new-account")
            .match_header("content-type", "application/jose+json")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_header("location", &format!("{url}/acct/1"))
            .with_header("replay-nonce", "nonce-after-account")
            .with_body(
                json!({
                    "status": "valid",
                    "termsOfServiceAgreed": true,
                    "contact": ["mailto:admin@example.com"],
                    "orders": format!("{url}/acct/1/orders")
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    /// A login for account 1, without going through registration
    pub fn login(&self) -> acmekit::Login {
        let session = acmekit::Session::new(&self.directory_url()).expect("session builds");
        let key = acmekit::AccountKey::generate_p256().expect("key generates");
        let account_url = url::Url::parse(&format!("{}/acct/1", self.url())).expect("url parses");
        acmekit::Login::new(session, account_url, key)
    }

    pub fn account_url(&self) -> String {
        format!("{}/acct/1", self.url())
    }
}

/// The exact base64url protected header of a kid-bound request, as the
/// engine serializes it (members in lexicographic order)
pub fn protected_kid(alg: &str, kid: &str, nonce: &str, url: &str) -> String {
    let header = format!(r#"{{"alg":"{alg}","kid":"{kid}","nonce":"{nonce}","url":"{url}"}}"#);
    URL_SAFE_NO_PAD.encode(header.as_bytes())
}

/// A problem+json response body with the given ACME error name
pub fn problem_body(error_name: &str, detail: &str) -> String {
    json!({
        "type": format!("urn:ietf:params:acme:error:{error_name}"),
        "detail": detail
    })
    .to_string()
}
