mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use support::TestApp;

#[tokio::test]
async fn direct_conversation_is_shared_and_ordered() {
    let app = TestApp::new();
    let (alice, alice_id) = app.signup("Alice", "alice@example.com").await;
    let (bob, bob_id) = app.signup("Bob", "bob@example.com").await;
    let (carol, _) = app.signup("Carol", "carol@example.com").await;

    let res = app
        .post(&format!("/api/messages/send/{}", bob_id), &alice, json!({ "text": "hi" }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["senderId"], alice_id.as_str());
    assert_eq!(res.body["receiverId"], bob_id.as_str());
    assert_eq!(res.body["text"], "hi");

    app.post(&format!("/api/messages/send/{}", alice_id), &bob, json!({ "text": "hello back" }))
        .await;

    let from_alice = app.get(&format!("/api/messages/{}", bob_id), &alice).await;
    let from_bob = app.get(&format!("/api/messages/{}", alice_id), &bob).await;
    assert_eq!(from_alice.status, StatusCode::OK);
    assert_eq!(from_alice.body, from_bob.body);

    let texts: Vec<&str> = from_alice
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["hi", "hello back"]);

    // Carol is in neither side of it
    let res = app.get(&format!("/api/messages/{}", alice_id), &carol).await;
    assert!(res.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn direct_message_validation_and_unknown_peer() {
    let app = TestApp::new();
    let (alice, _) = app.signup("Alice", "alice@example.com").await;
    let (_, bob_id) = app.signup("Bob", "bob@example.com").await;

    let res = app
        .post(&format!("/api/messages/send/{}", bob_id), &alice, json!({ "text": "" }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["validationErrors"][0]["message"], "Message cannot be empty");

    let res = app
        .post(&format!("/api/messages/send/{}", Uuid::new_v4()), &alice, json!({ "text": "hi" }))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.get("/api/messages/garbage", &alice).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn channel_messages_are_for_members_only() {
    let app = TestApp::new();
    let (alice, _) = app.signup("Alice", "alice@example.com").await;
    let (bob, bob_id) = app.signup("Bob", "bob@example.com").await;
    let (carol, _) = app.signup("Carol", "carol@example.com").await;

    let channel = app
        .post("/api/channels/create", &alice, json!({ "name": "General", "members": [bob_id] }))
        .await
        .id();

    let res = app
        .post(&format!("/api/messages/send/channel/{}", channel), &bob, json!({ "text": "hi all" }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["channelId"], channel.as_str());
    assert_eq!(res.body["sender"]["_id"], bob_id.as_str());
    assert_eq!(res.body["sender"]["fullName"], "Bob");

    let res = app
        .post(
            &format!("/api/messages/send/channel/{}", channel),
            &carol,
            json!({ "text": "let me in" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.message(), "You are not a member of this channel");

    let res = app.get(&format!("/api/messages/channel/{}", channel), &carol).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get(&format!("/api/messages/channel/{}", channel), &alice).await;
    assert_eq!(res.status, StatusCode::OK);
    let history = res.body.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["text"], "hi all");

    // Channel traffic never shows up in a personal conversation
    let res = app.get(&format!("/api/messages/{}", bob_id), &alice).await;
    assert!(res.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_channel_drops_its_history() {
    let app = TestApp::new();
    let (alice, _) = app.signup("Alice", "alice@example.com").await;

    let channel = app
        .post("/api/channels/create", &alice, json!({ "name": "General" }))
        .await
        .id();
    app.post(&format!("/api/messages/send/channel/{}", channel), &alice, json!({ "text": "hi" }))
        .await;

    let res = app
        .request(
            Method::DELETE,
            &format!("/api/channels/{}", channel),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app.get(&format!("/api/messages/channel/{}", channel), &alice).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
