mod common;

use common::{ok, MockServer, Recorded};
use nethttp::base::neterror::NetError;
use nethttp::http::{
    AuthScheme, AuthState, HttpCredentials, HttpMethod, HttpSession, HttpTransaction, TransactionEvent,
};
use std::sync::Arc;
use std::time::Duration;

async fn run(txn: &mut HttpTransaction) -> Vec<TransactionEvent> {
    let mut events = txn.subscribe();
    txn.submit().unwrap();
    let mut out = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), events.next_event())
        .await
        .unwrap()
    {
        out.push(event);
    }
    out
}

fn basic_server() -> common::Handler {
    Arc::new(|req: &Recorded| match req.header("Authorization").as_deref() {
        Some("Basic dXNlcjpwYXNz") => ok("welcome"),
        _ => b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"x\"\r\nContent-Length: 0\r\n\r\n"
            .to_vec(),
    })
}

#[tokio::test]
async fn test_basic_challenge_and_retry() {
    let server = MockServer::start(basic_server()).await;
    let session = HttpSession::builder()
        .host_address(&server.base_url)
        .build()
        .unwrap();

    let mut txn = session.open_transaction().unwrap();
    txn.request_mut().set_uri("/secret").unwrap();
    let seen = run(&mut txn).await;

    assert!(seen
        .iter()
        .any(|e| matches!(e, TransactionEvent::HeaderCompleted { auth_required: true, .. })));
    assert_eq!(seen.last(), Some(&TransactionEvent::Completed));
    assert_eq!(txn.response().unwrap().http_status_code(), 401);

    let mut auth = txn.open_authentication_info().unwrap();
    assert_eq!(auth.scheme(), AuthScheme::WwwBasic);
    assert_eq!(auth.realm(), "x");
    assert_eq!(auth.state(), AuthState::ChallengeReceived);

    let mut retry = auth
        .set_credentials(HttpCredentials::new("user", "pass"))
        .unwrap();
    assert_eq!(auth.state(), AuthState::Retrying);
    assert_eq!(retry.request().uri(), Some("/secret"));

    let seen = run(&mut retry).await;
    assert_eq!(seen.last(), Some(&TransactionEvent::Completed));
    let response = retry.response().unwrap();
    assert_eq!(response.http_status_code(), 200);
    assert_eq!(&response.read_all_body()[..], b"welcome");

    let sent = server.requests();
    assert_eq!(sent[0].header("Authorization"), None);
    assert_eq!(sent[1].header("Authorization").as_deref(), Some("Basic dXNlcjpwYXNz"));
}

#[tokio::test]
async fn test_credentials_rules() {
    let server = MockServer::start(basic_server()).await;
    let session = HttpSession::builder()
        .host_address(&server.base_url)
        .build()
        .unwrap();

    let mut txn = session.open_transaction().unwrap();
    txn.request_mut().set_uri("/secret").unwrap();
    run(&mut txn).await;

    let mut auth = txn.open_authentication_info().unwrap();
    assert_eq!(
        auth.set_credentials(HttpCredentials::new("us:er", "pass")).err(),
        Some(NetError::InvalidAuthCredentials)
    );
    assert_eq!(auth.state(), AuthState::ChallengeReceived);

    let _retry = auth.set_credentials(HttpCredentials::new("user", "pass")).unwrap();
    assert_eq!(
        auth.set_credentials(HttpCredentials::new("user", "pass")).err(),
        Some(NetError::InvalidState)
    );
}

#[tokio::test]
async fn test_no_challenge_no_auth_info() {
    let server = MockServer::start(Arc::new(|_: &Recorded| ok("open"))).await;
    let session = HttpSession::builder()
        .host_address(&server.base_url)
        .build()
        .unwrap();

    let mut txn = session.open_transaction().unwrap();
    txn.request_mut().set_uri("/public").unwrap();
    let seen = run(&mut txn).await;

    assert!(matches!(
        seen[0],
        TransactionEvent::HeaderCompleted { auth_required: false, .. }
    ));
    assert_eq!(txn.open_authentication_info().err(), Some(NetError::InvalidState));
}

#[tokio::test]
async fn test_digest_retry_carries_body() {
    let server = MockServer::start(Arc::new(|req: &Recorded| {
        match req.header("Authorization") {
            Some(value) if value.starts_with("Digest ") => ok("accepted"),
            _ => b"HTTP/1.1 401 Unauthorized\r\n\
                   WWW-Authenticate: Digest realm=\"vault\", nonce=\"n0nce\", qop=\"auth\"\r\n\
                   Content-Length: 0\r\n\r\n"
                .to_vec(),
        }
    }))
    .await;
    let session = HttpSession::builder()
        .host_address(&server.base_url)
        .build()
        .unwrap();

    let mut txn = session.open_transaction().unwrap();
    txn.request_mut().set_method(HttpMethod::Post).unwrap();
    txn.request_mut().set_uri("/vault?item=7").unwrap();
    txn.request_mut().write_body("payload").unwrap();
    run(&mut txn).await;

    let mut auth = txn.open_authentication_info().unwrap();
    assert_eq!(auth.scheme(), AuthScheme::WwwDigest);
    assert_eq!(auth.realm(), "vault");

    let mut retry = auth
        .set_credentials(HttpCredentials::new("alice", "secret"))
        .unwrap();
    let seen = run(&mut retry).await;
    assert_eq!(seen.last(), Some(&TransactionEvent::Completed));

    let sent = server.requests();
    let authorization = sent[1].header("Authorization").unwrap();
    assert!(authorization.starts_with("Digest username=\"alice\", realm=\"vault\", nonce=\"n0nce\""));
    assert!(authorization.contains("uri=\"/vault?item=7\""));
    assert_eq!(sent[1].request_line(), "POST /vault?item=7 HTTP/1.1");
    assert_eq!(sent[1].body_str(), "payload");
}
