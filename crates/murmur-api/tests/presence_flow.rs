mod support;

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use support::spawn_server;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn signup(client: &Client, base: &str, name: &str, email: &str) -> String {
    let user = client
        .post(format!("{}/api/auth/signup", base))
        .json(&json!({ "fullName": name, "email": email, "password": "secret1" }))
        .send()
        .await
        .expect("signup")
        .json::<Value>()
        .await
        .expect("signup json");
    user["_id"].as_str().expect("_id").to_string()
}

fn cookie_client() -> Client {
    Client::builder().cookie_store(true).build().expect("client")
}

async fn open_socket(addr: &std::net::SocketAddr, user_id: Option<&str>) -> Socket {
    let url = match user_id {
        Some(id) => format!("ws://{}/api/socket?userId={}", addr, id),
        None => format!("ws://{}/api/socket", addr),
    };
    let (ws, _) = connect_async(url).await.expect("ws connect");
    ws
}

/// Read events until one satisfies `pred`, skipping the rest.
async fn wait_for(ws: &mut Socket, pred: impl Fn(&Value) -> bool) -> Value {
    timeout(Duration::from_secs(5), async {
        while let Some(frame) = ws.next().await {
            if let Message::Text(text) = frame.expect("ws frame") {
                let event: Value = serde_json::from_str(text.as_str()).expect("event json");
                if pred(&event) {
                    return event;
                }
            }
        }
        panic!("socket closed before the expected event");
    })
    .await
    .expect("timed out waiting for event")
}

fn online_set_is(expected: &[&str]) -> impl Fn(&Value) -> bool {
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    move |event| {
        if event["event"] != "getOnlineUsers" {
            return false;
        }
        let mut ids: Vec<String> = event["data"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        ids.sort();
        ids == expected
    }
}

#[tokio::test]
async fn presence_and_live_delivery() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let alice = cookie_client();
    let bob = cookie_client();
    let alice_id = signup(&alice, &base, "Alice", "alice@example.com").await;
    let bob_id = signup(&bob, &base, "Bob", "bob@example.com").await;

    let mut alice_ws = open_socket(&addr, Some(&alice_id)).await;
    wait_for(&mut alice_ws, online_set_is(&[&alice_id])).await;

    let mut bob_ws = open_socket(&addr, Some(&bob_id)).await;
    wait_for(&mut bob_ws, online_set_is(&[&alice_id, &bob_id])).await;
    wait_for(&mut alice_ws, online_set_is(&[&alice_id, &bob_id])).await;

    // Personal message: pushed to Bob only
    let res = alice
        .post(format!("{}/api/messages/send/{}", base, bob_id))
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .expect("send");
    assert_eq!(res.status(), StatusCode::CREATED);

    let event = wait_for(&mut bob_ws, |e| e["event"] == "newMessage").await;
    assert_eq!(event["data"]["text"], "hi");
    assert_eq!(event["data"]["senderId"], alice_id.as_str());

    // Channel message: pushed to every member but the sender
    let channel = alice
        .post(format!("{}/api/channels/create", base))
        .json(&json!({ "name": "General", "members": [bob_id] }))
        .send()
        .await
        .expect("create channel")
        .json::<Value>()
        .await
        .expect("channel json");
    let channel_id = channel["_id"].as_str().unwrap().to_string();

    let res = bob
        .post(format!("{}/api/messages/send/channel/{}", base, channel_id))
        .json(&json!({ "text": "hello channel" }))
        .send()
        .await
        .expect("send channel");
    assert_eq!(res.status(), StatusCode::CREATED);

    let event = wait_for(&mut alice_ws, |e| e["event"] == "newMessage").await;
    assert_eq!(event["data"]["channelId"], channel_id.as_str());
    assert_eq!(event["data"]["sender"]["fullName"], "Bob");

    // Bob leaves; Alice sees the shrunken set
    bob_ws.close(None).await.expect("close");
    wait_for(&mut alice_ws, online_set_is(&[&alice_id])).await;

    // Offline receiver: stored, not pushed, still 201
    let res = alice
        .post(format!("{}/api/messages/send/{}", base, bob_id))
        .json(&json!({ "text": "you there?" }))
        .send()
        .await
        .expect("send offline");
    assert_eq!(res.status(), StatusCode::CREATED);

    let history = bob
        .get(format!("{}/api/messages/{}", base, alice_id))
        .send()
        .await
        .expect("history")
        .json::<Value>()
        .await
        .expect("history json");
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn anonymous_socket_sees_presence_but_is_not_counted() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let alice = cookie_client();
    let alice_id = signup(&alice, &base, "Alice", "alice@example.com").await;

    let mut anon_ws = open_socket(&addr, None).await;
    wait_for(&mut anon_ws, online_set_is(&[])).await;

    let _alice_ws = open_socket(&addr, Some(&alice_id)).await;
    wait_for(&mut anon_ws, online_set_is(&[&alice_id])).await;
}

#[tokio::test]
async fn malformed_user_id_is_rejected_before_upgrade() {
    let (addr, _shutdown) = spawn_server().await;

    let result = connect_async(format!("ws://{}/api/socket?userId=garbage", addr)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn newest_connection_wins_and_stale_close_keeps_it() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let alice = cookie_client();
    let bob = cookie_client();
    signup(&alice, &base, "Alice", "alice@example.com").await;
    let bob_id = signup(&bob, &base, "Bob", "bob@example.com").await;

    let mut first = open_socket(&addr, Some(&bob_id)).await;
    wait_for(&mut first, online_set_is(&[&bob_id])).await;
    let mut second = open_socket(&addr, Some(&bob_id)).await;
    wait_for(&mut second, online_set_is(&[&bob_id])).await;

    // The old socket closing must not take Bob offline
    first.close(None).await.expect("close");
    wait_for(&mut second, online_set_is(&[&bob_id])).await;

    alice
        .post(format!("{}/api/messages/send/{}", base, bob_id))
        .json(&json!({ "text": "which tab?" }))
        .send()
        .await
        .expect("send");

    let event = wait_for(&mut second, |e| e["event"] == "newMessage").await;
    assert_eq!(event["data"]["text"], "which tab?");
}

/// Sign up without a cookie store and hand back `(id, "jwt=...")`.
async fn signup_with_cookie(base: &str, name: &str, email: &str) -> (String, String) {
    let res = Client::new()
        .post(format!("{}/api/auth/signup", base))
        .json(&json!({ "fullName": name, "email": email, "password": "secret1" }))
        .send()
        .await
        .expect("signup");
    let cookie = res
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string();
    let user = res.json::<Value>().await.expect("signup json");
    (user["_id"].as_str().expect("_id").to_string(), cookie)
}

async fn open_socket_with_cookie(
    addr: &std::net::SocketAddr,
    user_id: &str,
    cookie: &str,
) -> Result<Socket, WsError> {
    let mut request = format!("ws://{}/api/socket?userId={}", addr, user_id)
        .into_client_request()
        .expect("ws request");
    request
        .headers_mut()
        .insert(header::COOKIE, HeaderValue::from_str(cookie).expect("cookie header"));
    connect_async(request).await.map(|(ws, _)| ws)
}

#[tokio::test]
async fn session_cannot_claim_another_accounts_stream() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let (alice_id, alice_cookie) = signup_with_cookie(&base, "Alice", "alice@example.com").await;
    let (bob_id, _) = signup_with_cookie(&base, "Bob", "bob@example.com").await;

    match open_socket_with_cookie(&addr, &bob_id, &alice_cookie).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 403),
        Err(e) => panic!("expected a 403 handshake rejection, got {}", e),
        Ok(_) => panic!("socket for another account was accepted"),
    }

    match open_socket_with_cookie(&addr, &alice_id, "jwt=not.a.token").await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
        Err(e) => panic!("expected a 401 handshake rejection, got {}", e),
        Ok(_) => panic!("socket with a forged session was accepted"),
    }

    let mut ws = open_socket_with_cookie(&addr, &alice_id, &alice_cookie)
        .await
        .expect("own socket");
    wait_for(&mut ws, online_set_is(&[&alice_id])).await;
}
