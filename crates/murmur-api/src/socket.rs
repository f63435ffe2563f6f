use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use murmur_gateway::connection;

use crate::error::{ApiError, parse_id};
use crate::middleware::session_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketQuery {
    pub user_id: Option<String>,
}

/// GET /socket?userId=…
///
/// Upgrade to the presence/delivery connection. When the handshake carries a
/// session, it must belong to the account named by `userId`.
pub async fn socket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = match query.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_id(raw, "user")?),
        None => None,
    };

    if let Some(token) = session_token(&headers) {
        let claims = state
            .auth
            .verify_token(&token)
            .map_err(|_| ApiError::Unauthorized("Unauthorized - Invalid Token".into()))?;
        check_session_owner(user_id, claims.sub)?;
    }

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user_id)))
}

fn check_session_owner(user_id: Option<Uuid>, session: Uuid) -> Result<(), ApiError> {
    match user_id {
        Some(id) if id != session => Err(ApiError::Forbidden(
            "Socket userId does not match the signed-in account".into(),
        )),
        _ => Ok(()),
    }
}
