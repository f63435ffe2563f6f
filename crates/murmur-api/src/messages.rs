use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use murmur_types::api::SendMessageRequest;
use murmur_types::events::{GatewayEvent, NewMessage};
use murmur_types::models::{ChannelMessage, Message, User};

use crate::channels::{channel_not_found, find_channel};
use crate::error::{ApiError, parse_id};
use crate::state::AppState;
use crate::validation::ValidatedJson;

/// GET /messages/{id}
///
/// The personal conversation between the caller and `id`.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer): Path<String>,
    Extension(me): Extension<User>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let peer = find_user(&state, &peer).await?;

    let my_id = me.id.to_string();
    let messages = state
        .with_db(move |db| {
            db.get_conversation(&my_id, &peer.to_string())?
                .into_iter()
                .map(|row| row.into_message())
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

    Ok(Json(messages))
}

/// POST /messages/send/{id}
///
/// Persist, then push to the receiver if connected.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver): Path<String>,
    Extension(me): Extension<User>,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver = find_user(&state, &receiver).await?;

    let message_id = Uuid::new_v4().to_string();
    let sender_id = me.id.to_string();
    let message = state
        .with_db(move |db| {
            db.insert_direct_message(
                &message_id,
                &sender_id,
                &receiver.to_string(),
                &req.text,
                req.image.as_deref(),
            )?
            .into_message()
        })
        .await?;

    let event = GatewayEvent::NewMessage(NewMessage::Direct(message.clone()));
    if !state.dispatcher.send_to_user(receiver, event).await {
        debug!("{} is offline, message {} left for history", receiver, message.id);
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/channel/{id}
///
/// Members only.
pub async fn get_channel_messages(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Extension(me): Extension<User>,
) -> Result<Json<Vec<ChannelMessage>>, ApiError> {
    let cid = parse_id(&channel, "channel")?.to_string();
    let (key, my_id) = (cid.clone(), me.id.to_string());
    let (exists, member) = state
        .with_db(move |db| Ok((db.get_channel(&key)?.is_some(), db.is_channel_member(&key, &my_id)?)))
        .await?;
    if !exists {
        return Err(channel_not_found());
    }
    if !member {
        return Err(not_a_member());
    }

    let messages = state
        .with_db(move |db| {
            db.get_channel_messages(&cid)?
                .into_iter()
                .map(|row| row.into_channel_message())
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

    Ok(Json(messages))
}

/// POST /messages/send/channel/{id}
///
/// Members only. Every other connected
/// member gets `newMessage`.
pub async fn send_channel_message(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Extension(me): Extension<User>,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = find_channel(&state, &channel).await?;
    if !channel.has_member(me.id) {
        return Err(not_a_member());
    }

    let message_id = Uuid::new_v4().to_string();
    let sender_id = me.id.to_string();
    let cid = channel.id.to_string();
    let message = state
        .with_db(move |db| {
            db.insert_channel_message(&message_id, &sender_id, &cid, &req.text, req.image.as_deref())?
                .into_channel_message()
        })
        .await?;

    let event = GatewayEvent::NewMessage(NewMessage::Channel(message.clone()));
    for member in channel.members.iter().filter(|m| m.id != me.id) {
        state.dispatcher.send_to_user(member.id, event.clone()).await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// Parse a path id and make sure the account exists: malformed → 400, missing → 404.
async fn find_user(state: &AppState, raw_id: &str) -> Result<Uuid, ApiError> {
    let id = parse_id(raw_id, "user")?;
    let key = id.to_string();
    state
        .with_db(move |db| db.get_user_by_id(&key))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(id)
}

fn not_a_member() -> ApiError {
    ApiError::Forbidden("You are not a member of this channel".into())
}
