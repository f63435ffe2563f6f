use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use murmur_types::api::{FieldError, Normalize};

use crate::error::ClientError;

/// HTTP session against one Murmur server. The cookie store keeps the
/// `jwt` session cookie between calls, so clones share a session.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:5001`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// The relay socket URL for `user_id`, on the same host as the REST API.
    pub fn socket_url(&self, user_id: Uuid) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/api/socket?userId={}", ws_base, user_id)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ClientError> {
        self.execute(self.http.get(self.url(path)).query(query)).await
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.http.request(method, self.url(path)).json(body)).await
    }

    pub async fn send_empty<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, ClientError> {
        self.execute(self.http.request(method, self.url(path))).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        Err(error_from_response(response).await)
    }
}

/// Map a non-2xx response onto `ClientError`, keeping the server's wording.
async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if let Some(errors) = body.get("validationErrors") {
        if let Ok(errors) = serde_json::from_value::<Vec<FieldError>>(errors.clone()) {
            return ClientError::Validation(errors);
        }
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| status.canonical_reason())
        .unwrap_or("Something went wrong")
        .to_string();

    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Apply the same normalization and rules the server will, so obviously bad
/// input never leaves the process.
pub(crate) fn checked<T: Normalize + Validate>(req: T) -> Result<T, ClientError> {
    let req = req.normalize();
    req.validate()?;
    Ok(req)
}
