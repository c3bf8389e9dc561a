//! HTTP adapters against a local mock server.

use std::time::Duration;

use chrono::Utc;
use deadswitch_core::collaborators::{
    AccountClient, ContactDirectory, Incident, IncidentStore, MessageSender, RelayClient,
};
use deadswitch_core::memory::StaticToken;
use deadswitch_core::{CollaboratorError, ContactRef};
use mockito::Matcher;
use serde_json::json;
use uuid::Uuid;

fn relay(server: &mockito::Server) -> RelayClient {
    RelayClient::new(&server.url(), Duration::from_secs(5)).unwrap()
}

fn incident() -> Incident {
    Incident {
        session_id: Uuid::new_v4(),
        cycle: 3,
        at: Utc::now(),
    }
}

#[test]
fn send_posts_target_and_message() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/send-message")
        .match_body(Matcher::Json(json!({
            "target_username": "Alice",
            "message": "please call",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true,"message":"Message sent successfully"}"#)
        .create();

    relay(&server)
        .send(&ContactRef::new("@Alice"), "please call")
        .unwrap();
    mock.assert();
}

#[test]
fn send_requires_success_flag() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/send-message")
        .with_status(200)
        .with_body(r#"{"success":false}"#)
        .create();

    let err = relay(&server)
        .send(&ContactRef::new("alice"), "hi")
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::Rejected { status: 200, .. }));
}

#[test]
fn send_reports_http_error() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/send-message")
        .with_status(404)
        .with_body(r#"{"error":"User \"alice\" not found in database"}"#)
        .create();

    match relay(&server).send(&ContactRef::new("alice"), "hi") {
        Err(CollaboratorError::Rejected { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.contains("not found"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn users_are_normalized() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/users")
        .with_status(200)
        .with_body(r#"{"success":true,"users":["@Alice","bob"]}"#)
        .create();

    let users = relay(&server).list_reachable().unwrap();
    assert!(users.contains("alice"));
    assert!(users.contains("bob"));
    assert_eq!(users.len(), 2);
}

#[test]
fn users_listing_failure_is_an_error() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/users")
        .with_status(500)
        .with_body(r#"{"error":"Failed to load users"}"#)
        .create();

    assert!(relay(&server).list_reachable().is_err());
}

#[test]
fn incident_is_posted_with_bearer_token() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/auth/increment-death")
        .match_header("authorization", "Bearer tok-123")
        .match_body(Matcher::PartialJson(json!({ "cycle": 3 })))
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create();

    let client = AccountClient::new(
        &server.url(),
        Duration::from_secs(5),
        Box::new(StaticToken::new("tok-123")),
    )
    .unwrap();
    client.record_incident(&incident()).unwrap();
    mock.assert();
}

#[test]
fn incident_without_token_is_not_sent() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/auth/increment-death")
        .expect(0)
        .create();

    let client = AccountClient::new(
        &server.url(),
        Duration::from_secs(5),
        Box::new(StaticToken::none()),
    )
    .unwrap();
    assert!(matches!(
        client.record_incident(&incident()),
        Err(CollaboratorError::NotAuthenticated)
    ));
    mock.assert();
}
