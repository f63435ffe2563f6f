use std::net::SocketAddr;
use std::time::Duration;

use tokio::{net::TcpListener, sync::oneshot, time::timeout};

use murmur_api::AppStateInner;
use murmur_api::auth::AuthConfig;
use murmur_client::{ApiClient, AuthStore, ChatStore, ClientError};
use murmur_db::Database;
use murmur_gateway::dispatcher::Dispatcher;
use murmur_types::api::{CreateChannelRequest, LoginRequest, SendMessageRequest, SignupRequest};

async fn spawn_server() -> (SocketAddr, oneshot::Sender<()>) {
    let state = AppStateInner::new(
        Database::open_in_memory().expect("in-memory db"),
        Dispatcher::new(),
        AuthConfig {
            jwt_secret: "test-secret-key".into(),
            secure_cookies: false,
        },
    );
    let router = murmur_api::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    (addr, shutdown_tx)
}

fn signup_request(name: &str, email: &str) -> SignupRequest {
    SignupRequest {
        full_name: name.into(),
        email: email.into(),
        password: "secret1".into(),
    }
}

fn text(body: &str) -> SendMessageRequest {
    SendMessageRequest {
        text: body.into(),
        image: None,
    }
}

/// Pull events until one changes the chat state.
async fn deliver(auth: &mut AuthStore, chat: &mut ChatStore) {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = auth.next_event().await.expect("socket").expect("socket closed");
            if chat.apply_event(&event) {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for delivery");
}

/// Wait until the relay has registered this account's socket.
async fn wait_online(auth: &mut AuthStore) {
    let me = auth.auth_user.as_ref().expect("signed in").id;
    timeout(Duration::from_secs(5), async {
        while !auth.is_online(me) {
            auth.next_event().await.expect("socket").expect("socket closed");
        }
    })
    .await
    .expect("timed out waiting for presence");
}

#[tokio::test]
async fn general_channel_scenario() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let mut alice = AuthStore::new(ApiClient::new(&base).unwrap());
    let mut bob = AuthStore::new(ApiClient::new(&base).unwrap());

    let alice_id = alice.signup(signup_request("Alice", "alice@example.com")).await.unwrap().id;
    let bob_id = bob.signup(signup_request("Bob", "bob@example.com")).await.unwrap().id;

    // Bob is online and looking at General once it exists
    bob.connect_socket().await.unwrap();
    wait_online(&mut bob).await;
    let mut bob_chat = ChatStore::new(bob.api().clone());

    let mut alice_chat = ChatStore::new(alice.api().clone());
    let general = alice_chat
        .create_channel(CreateChannelRequest {
            name: "General".into(),
            members: vec![bob_id.to_string()],
        })
        .await
        .unwrap();
    let members: Vec<_> = general.members.iter().map(|m| m.id).collect();
    assert_eq!(members, [alice_id, bob_id]);

    bob_chat.get_channels(None).await.unwrap();
    assert_eq!(bob_chat.channels.len(), 1);
    bob_chat.set_selected_channel(Some(bob_chat.channels[0].clone()));

    alice_chat.set_selected_channel(Some(general.clone()));
    alice_chat.send_channel_message(text("hi")).await.unwrap();

    deliver(&mut bob, &mut bob_chat).await;
    assert_eq!(bob_chat.channel_messages.len(), 1);
    assert_eq!(bob_chat.channel_messages[0].text, "hi");

    let history = alice_chat.get_channel_messages(general.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender.full_name, "Alice");
    assert_eq!(history[0].text, "hi");
}

#[tokio::test]
async fn personal_messages_and_presence() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let mut alice = AuthStore::new(ApiClient::new(&base).unwrap());
    let mut bob = AuthStore::new(ApiClient::new(&base).unwrap());
    alice.signup(signup_request("Alice", "alice@example.com")).await.unwrap();
    bob.signup(signup_request("Bob", "bob@example.com")).await.unwrap();

    bob.connect_socket().await.unwrap();
    wait_online(&mut bob).await;

    let mut alice_chat = ChatStore::new(alice.api().clone());
    let users = alice_chat.get_users(Some("bo")).await.unwrap();
    assert_eq!(users.len(), 1);
    let bob_user = users[0].clone();
    alice_chat.set_selected_user(Some(bob_user));

    let mut bob_chat = ChatStore::new(bob.api().clone());
    bob_chat.set_selected_user(alice.auth_user.clone());

    alice_chat.send_message(text("hi bob")).await.unwrap();
    assert_eq!(alice_chat.messages.len(), 1);

    deliver(&mut bob, &mut bob_chat).await;
    assert_eq!(bob_chat.messages[0].text, "hi bob");

    bob.logout().await.unwrap();
    assert!(bob.auth_user.is_none());
    assert!(!bob.is_connected());
    assert!(bob.check_auth().await.is_none());

    // Signing back in restores the same history
    bob.login(LoginRequest {
        email: "bob@example.com".into(),
        password: "secret1".into(),
    })
    .await
    .unwrap();
    let alice_id = alice.auth_user.as_ref().unwrap().id;
    let history = bob_chat.get_messages(alice_id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn errors_surface_with_server_wording() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{}", addr);

    let mut alice = AuthStore::new(ApiClient::new(&base).unwrap());

    // Caught locally, never sent
    let err = alice.signup(signup_request("A", "not-an-email")).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(ref e) if e.len() == 2));

    let err = alice
        .login(LoginRequest {
            email: "nobody@example.com".into(),
            password: "secret1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 400, ref message } if message == "Invalid credentials"));

    assert!(matches!(alice.connect_socket().await, Err(ClientError::NotSignedIn)));

    let mut chat = ChatStore::new(alice.api().clone());
    assert!(matches!(chat.send_message(text("hi")).await, Err(ClientError::NothingSelected)));

    let err = chat.get_users(None).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
}
