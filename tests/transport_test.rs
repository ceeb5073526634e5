mod common;

use acmekit::prelude::*;
use acmekit::{AcmeError, ResourceKind};
use common::{MockAcmeServer, problem_body, protected_kid};
use serde_json::json;

#[tokio::test]
async fn bad_nonce_is_retried_exactly_once() {
    let mut mock = MockAcmeServer::new().await;
    let _dir = mock.mock_directory().await;
    let _nonce = mock.mock_new_nonce("nonce-1").await;
    let login = mock.login();
    let account_url = mock.account_url();

    // first attempt carries the HEAD-acquired nonce and is rejected
    let rejected = mock
        .server
        .mock("POST", "/acct/1")
        .match_body(mockito::Matcher::PartialJson(json!({
            "protected": protected_kid("ES256", &account_url, "nonce-1", &account_url),
        })))
        .with_status(400)
        .with_header("content-type", "application/problem+json")
        .with_header("replay-nonce", "nonce-2")
        .with_body(problem_body("badNonce", "stale nonce"))
        .expect(1)
        .create_async()
        .await;

    // the retry must use the nonce the error response supplied
    let accepted = mock
        .server
        .mock("POST", "/acct/1")
        .match_body(mockito::Matcher::PartialJson(json!({
            "protected": protected_kid("ES256", &account_url, "nonce-2", &account_url),
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("replay-nonce", "nonce-3")
        .with_body(json!({"status": "deactivated"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut account = login.account();
    account.deactivate().await.unwrap();

    rejected.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(account.status(), Some(AccountStatus::Deactivated));
}

#[tokio::test]
async fn bad_nonce_twice_is_not_retried_again() {
    let mut mock = MockAcmeServer::new().await;
    let _dir = mock.mock_directory().await;
    let _nonce = mock.mock_new_nonce("nonce-1").await;
    let login = mock.login();

    let always_rejected = mock
        .server
        .mock("POST", "/acct/1")
        .with_status(400)
        .with_header("content-type", "application/problem+json")
        .with_header("replay-nonce", "nonce-fresh")
        .with_body(problem_body("badNonce", "stale nonce"))
        .expect(2)
        .create_async()
        .await;

    let mut account = login.account();
    let err = account.deactivate().await.unwrap_err();
    assert_eq!(err.problem_kind(), Some(ProblemKind::BadNonce));
    always_rejected.assert_async().await;
}

#[tokio::test]
async fn rate_limited_surfaces_retry_after() {
    let mut mock = MockAcmeServer::new().await;
    let _dir = mock.mock_directory().await;
    let _nonce = mock.mock_new_nonce("nonce-1").await;
    let login = mock.login();

    let _limited = mock
        .server
        .mock("POST", "/new-order")
        .with_status(429)
        .with_header("content-type", "application/problem+json")
        .with_header("retry-after", "120")
        .with_body(problem_body("rateLimited", "too many requests"))
        .create_async()
        .await;

    let err = login
        .new_order()
        .domain("example.com")
        .unwrap()
        .create()
        .await
        .unwrap_err();

    assert_eq!(err.problem_kind(), Some(ProblemKind::RateLimited));
    assert!(err.retry_after().is_some());
    assert_eq!(err.to_string(), "too many requests");
}

#[tokio::test]
async fn directory_is_fetched_once_and_cached() {
    let mut mock = MockAcmeServer::new().await;
    let dir = mock.mock_directory().await;
    let session = mock.session().await;

    let url = session.resource_url(ResourceKind::NewOrder).await.unwrap();
    assert_eq!(url.as_str(), format!("{}/new-order", mock.url()));
    let url = session.resource_url(ResourceKind::RevokeCert).await.unwrap();
    assert_eq!(url.as_str(), format!("{}/revoke-cert", mock.url()));

    dir.assert_async().await; // a single GET served both lookups
}

#[tokio::test]
async fn missing_directory_entry_is_unsupported() {
    let mut mock = MockAcmeServer::new().await;
    let _dir = mock.mock_directory().await;
    let session = mock.session().await;

    let err = session.resource_url(ResourceKind::NewAuthz).await.unwrap_err();
    assert!(matches!(err, AcmeError::Unsupported(_)));
}

#[tokio::test]
async fn malformed_directory_is_a_protocol_error() {
    let mut mock = MockAcmeServer::new().await;
    let _dir = mock
        .server
        .mock("GET", "/directory")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{\"newNonce\": 42}")
        .create_async()
        .await;
    let session = mock.session().await;

    let err = session.resource_url(ResourceKind::NewNonce).await.unwrap_err();
    assert!(matches!(err, AcmeError::Protocol(_)));
}
