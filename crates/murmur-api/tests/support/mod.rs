#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot};
use tower::ServiceExt;

use murmur_api::auth::AuthConfig;
use murmur_api::{AppState, AppStateInner};
use murmur_db::Database;
use murmur_gateway::dispatcher::Dispatcher;

pub const TEST_SECRET: &str = "test-secret-key";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: TEST_SECRET.to_string(),
        secure_cookies: false,
    }
}

pub fn build_state() -> AppState {
    let db = Database::open_in_memory().expect("in-memory db");
    AppStateInner::new(db, Dispatcher::new(), auth_config())
}

/// Drives the real router in-process, one `oneshot` per request.
#[derive(Clone)]
pub struct TestApp {
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `jwt=<token>` from the `Set-Cookie` header, ready to send back.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("jwt="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    pub fn raw_set_cookie(&self) -> String {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    pub fn id(&self) -> String {
        self.body["_id"].as_str().expect("_id in body").to_string()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            router: murmur_api::router(build_state()),
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("router");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };

        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(cookie), Some(body)).await
    }

    /// Sign up and return (session cookie, user id).
    pub async fn signup(&self, full_name: &str, email: &str) -> (String, String) {
        let res = self
            .request(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(serde_json::json!({
                    "fullName": full_name,
                    "email": email,
                    "password": "secret1",
                })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "signup {}: {}", email, res.body);

        (res.session_cookie().expect("session cookie"), res.id())
    }
}

/// Serve the router on an ephemeral port. Dropping the sender stops it.
pub async fn spawn_server() -> (SocketAddr, oneshot::Sender<()>) {
    let router = murmur_api::router(build_state());
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
