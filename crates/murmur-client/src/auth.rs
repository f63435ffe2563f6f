use futures_util::StreamExt;
use reqwest::Method;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_types::api::{LoginRequest, SignupRequest, StatusResponse, UpdateProfileRequest};
use murmur_types::events::GatewayEvent;
use murmur_types::models::User;

use crate::api::{ApiClient, checked};
use crate::error::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The signed-in account and its relay connection.
pub struct AuthStore {
    api: ApiClient,
    pub auth_user: Option<User>,
    /// Last `getOnlineUsers` set received on the socket.
    pub online_users: Vec<Uuid>,
    socket: Option<Socket>,
}

impl AuthStore {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            auth_user: None,
            online_users: Vec::new(),
            socket: None,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online_users.contains(&user_id)
    }

    /// Resume an existing session. Any failure just means signed out.
    pub async fn check_auth(&mut self) -> Option<&User> {
        match self.api.get::<User>("/users/me", &[]).await {
            Ok(user) => self.auth_user = Some(user),
            Err(e) => {
                debug!("no active session: {}", e);
                self.auth_user = None;
            }
        }
        self.auth_user.as_ref()
    }

    pub async fn signup(&mut self, req: SignupRequest) -> Result<&User, ClientError> {
        let req = checked(req)?;
        let user: User = self.api.send_json(Method::POST, "/auth/signup", &req).await?;
        info!("signed up as {}", user.id);
        Ok(self.auth_user.insert(user))
    }

    pub async fn login(&mut self, req: LoginRequest) -> Result<&User, ClientError> {
        let req = checked(req)?;
        let user: User = self.api.send_json(Method::POST, "/auth/login", &req).await?;
        info!("logged in as {}", user.id);
        Ok(self.auth_user.insert(user))
    }

    /// Ends the session server-side, then drops the socket and local state.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let _: StatusResponse = self.api.send_empty(Method::POST, "/auth/logout").await?;
        self.disconnect_socket().await;
        self.auth_user = None;
        Ok(())
    }

    pub async fn update_profile(&mut self, req: UpdateProfileRequest) -> Result<&User, ClientError> {
        if self.auth_user.is_none() {
            return Err(ClientError::NotSignedIn);
        }
        let req = checked(req)?;
        let user: User = self.api.send_json(Method::PUT, "/auth/update-profile", &req).await?;
        Ok(self.auth_user.insert(user))
    }

    /// Open the relay socket for the signed-in account. No-op if already open.
    pub async fn connect_socket(&mut self) -> Result<(), ClientError> {
        let user_id = self.auth_user.as_ref().ok_or(ClientError::NotSignedIn)?.id;
        if self.socket.is_some() {
            return Ok(());
        }

        let (socket, _) = connect_async(self.api.socket_url(user_id)).await?;
        self.socket = Some(socket);
        debug!("relay socket open for {}", user_id);
        Ok(())
    }

    pub async fn disconnect_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("socket close: {}", e);
            }
        }
        self.online_users.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Wait for the next relay event. `getOnlineUsers` also refreshes
    /// `online_users`. Returns `Ok(None)` once the socket has closed.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(ClientError::NotSignedIn);
        };

        while let Some(frame) = socket.next().await {
            match frame? {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(event) => {
                        if let GatewayEvent::GetOnlineUsers(ids) = &event {
                            self.online_users = ids.clone();
                        }
                        return Ok(Some(event));
                    }
                    Err(e) => warn!("unrecognised relay frame: {}", e),
                },
                WsMessage::Close(_) => break,
                // tungstenite answers pings itself
                _ => {}
            }
        }

        self.socket = None;
        self.online_users.clear();
        Ok(None)
    }
}
