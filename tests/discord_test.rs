//! Discord messenger against a local mock server.

use autolog::messenger::{DiscordMessenger, Messenger, MessengerError};
use mockito::Matcher;
use secrecy::SecretString;
use serde_json::json;

fn messenger(server: &mockito::ServerGuard) -> DiscordMessenger {
    DiscordMessenger::with_api_base(SecretString::from("bot-token".to_string()), server.url())
        .unwrap()
}

#[tokio::test]
async fn sends_via_dm_channel_when_member() {
    let mut server = mockito::Server::new_async().await;
    let member = server
        .mock("GET", "/guilds/g1/members/u1")
        .match_header("authorization", "Bot bot-token")
        .with_status(200)
        .with_body(r#"{"user":{"id":"u1"}}"#)
        .create_async()
        .await;
    let channel = server
        .mock("POST", "/users/@me/channels")
        .match_body(Matcher::Json(json!({"recipient_id": "u1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"dm-9"}"#)
        .create_async()
        .await;
    let message = server
        .mock("POST", "/channels/dm-9/messages")
        .match_body(Matcher::Json(json!({"content": "Work logged"})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    messenger(&server)
        .send_direct("u1", "g1", "Work logged")
        .await
        .unwrap();

    member.assert_async().await;
    channel.assert_async().await;
    message.assert_async().await;
}

#[tokio::test]
async fn long_summary_is_sent_in_chunks() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/guilds/g1/members/u1")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    server
        .mock("POST", "/users/@me/channels")
        .with_status(200)
        .with_body(r#"{"id":"dm-9"}"#)
        .create_async()
        .await;
    let messages = server
        .mock("POST", "/channels/dm-9/messages")
        .with_status(200)
        .with_body("{}")
        .expect(2)
        .create_async()
        .await;

    let line = "x".repeat(1_500);
    messenger(&server)
        .send_direct("u1", "g1", &format!("{line}\n{line}"))
        .await
        .unwrap();

    messages.assert_async().await;
}

#[tokio::test]
async fn non_member_is_not_messaged() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/guilds/g1/members/u1")
        .with_status(404)
        .with_body(r#"{"message":"Unknown Member","code":10007}"#)
        .create_async()
        .await;
    let channel = server
        .mock("POST", "/users/@me/channels")
        .expect(0)
        .create_async()
        .await;

    let err = messenger(&server)
        .send_direct("u1", "g1", "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, MessengerError::NotMember { .. }));
    channel.assert_async().await;
}

#[tokio::test]
async fn closed_direct_messages_are_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/guilds/g1/members/u1")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    server
        .mock("POST", "/users/@me/channels")
        .with_status(200)
        .with_body(r#"{"id":"dm-9"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/channels/dm-9/messages")
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Cannot send messages to this user","code":50007}"#)
        .create_async()
        .await;

    let err = messenger(&server)
        .send_direct("u1", "g1", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::DirectMessagesDisabled(ref id) if id == "u1"));
}

#[tokio::test]
async fn other_failures_carry_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/guilds/g1/members/u1")
        .with_status(500)
        .with_body(r#"{"message":"oops"}"#)
        .create_async()
        .await;

    let err = messenger(&server)
        .send_direct("u1", "g1", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Api { status: 500, .. }));
}
