use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use murmur_db::Database;
use murmur_types::api::{AddMembersRequest, CreateChannelRequest, StatusResponse, UpdateChannelRequest};
use murmur_types::models::{Channel, User};

use crate::error::{ApiError, parse_id};
use crate::state::AppState;
use crate::users::SearchQuery;
use crate::validation::ValidatedJson;

const UNKNOWN_MEMBERS: &str = "One or more member IDs do not exist";

/// GET /channels
///
/// Every channel, not only the caller's.
pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Channel>>, ApiError> {
    let channels = state
        .with_db(move |db| {
            let rows = db.list_channels(query.search.as_deref())?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let members = db.get_channel_members(&ids)?;
            rows.into_iter()
                .map(|row| row.into_channel(&members))
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

    Ok(Json(channels))
}

/// POST /channels/create
///
/// The caller becomes creator and first member.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
    ValidatedJson(req): ValidatedJson<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member_ids = canonical_ids(&req.members, Some(me.id))?;
    ensure_users_exist(&state, &member_ids).await?;

    let channel_id = Uuid::new_v4().to_string();
    let creator_id = me.id.to_string();
    let channel = state
        .with_db(move |db| {
            db.create_channel(&channel_id, &req.name, &creator_id, &member_ids)?;
            load_channel(db, &channel_id)?.ok_or_else(|| anyhow::anyhow!("channel {} vanished", channel_id))
        })
        .await?;

    info!("{} created channel {} ({})", me.id, channel.id, channel.name);
    Ok((StatusCode::CREATED, Json(channel)))
}

/// PATCH /channels/{id}
///
/// Creator only.
pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(me): Extension<User>,
    ValidatedJson(req): ValidatedJson<UpdateChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = find_channel(&state, &id).await?;
    require_creator(&channel, &me)?;

    let cid = channel.id.to_string();
    let updated = state
        .with_db(move |db| {
            db.rename_channel(&cid, &req.name)?;
            load_channel(db, &cid)
        })
        .await?
        .ok_or_else(channel_not_found)?;

    Ok(Json(updated))
}

/// POST /channels/{id}/members
///
/// Creator only. Existing members are ignored.
pub async fn add_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(me): Extension<User>,
    ValidatedJson(req): ValidatedJson<AddMembersRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = find_channel(&state, &id).await?;
    require_creator(&channel, &me)?;

    let member_ids = canonical_ids(&req.members, None)?;
    ensure_users_exist(&state, &member_ids).await?;

    let cid = channel.id.to_string();
    let updated = state
        .with_db(move |db| {
            db.add_channel_members(&cid, &member_ids)?;
            load_channel(db, &cid)
        })
        .await?
        .ok_or_else(channel_not_found)?;

    Ok(Json(updated))
}

/// DELETE /channels/{id}/members/{member_id}
///
/// The creator may remove anyone but themselves; any other member may
/// remove only themselves (leave).
pub async fn remove_member(
    State(state): State<AppState>,
    Path((id, member_id)): Path<(String, String)>,
    Extension(me): Extension<User>,
) -> Result<Json<Channel>, ApiError> {
    let member_id = parse_id(&member_id, "member")?;
    let channel = find_channel(&state, &id).await?;

    if member_id == channel.creator {
        return Err(ApiError::BadRequest("The channel creator cannot be removed".into()));
    }
    if me.id != channel.creator && me.id != member_id {
        return Err(ApiError::Forbidden(
            "Only the channel creator can remove other members".into(),
        ));
    }
    if !channel.has_member(member_id) {
        return Err(ApiError::NotFound("Member not found in channel".into()));
    }

    let cid = channel.id.to_string();
    let mid = member_id.to_string();
    let updated = state
        .with_db(move |db| {
            db.remove_channel_member(&cid, &mid)?;
            load_channel(db, &cid)
        })
        .await?
        .ok_or_else(channel_not_found)?;

    Ok(Json(updated))
}

/// DELETE /channels/{id}
///
/// Creator only. Memberships and messages go with it.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(me): Extension<User>,
) -> Result<Json<StatusResponse>, ApiError> {
    let channel = find_channel(&state, &id).await?;
    require_creator(&channel, &me)?;

    let cid = channel.id.to_string();
    if !state.with_db(move |db| db.delete_channel(&cid)).await? {
        return Err(channel_not_found());
    }

    info!("{} deleted channel {}", me.id, channel.id);
    Ok(Json(StatusResponse::new("Channel deleted successfully")))
}

/// Channel row plus its members, or `None` if it does not exist.
pub(crate) fn load_channel(db: &Database, id: &str) -> anyhow::Result<Option<Channel>> {
    let Some(row) = db.get_channel(id)? else {
        return Ok(None);
    };
    let members = db.get_channel_members(&[id.to_string()])?;
    Ok(Some(row.into_channel(&members)?))
}

/// Parse a path id and load the channel: malformed → 400, missing → 404.
pub(crate) async fn find_channel(state: &AppState, raw_id: &str) -> Result<Channel, ApiError> {
    let id = parse_id(raw_id, "channel")?.to_string();
    state
        .with_db(move |db| load_channel(db, &id))
        .await?
        .ok_or_else(channel_not_found)
}

pub(crate) fn channel_not_found() -> ApiError {
    ApiError::NotFound("Channel not found".into())
}

fn require_creator(channel: &Channel, me: &User) -> Result<(), ApiError> {
    if channel.creator == me.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Only the channel creator can modify this channel".into(),
        ))
    }
}

/// Canonical (lowercase hyphenated) ids in first-seen order, without
/// duplicates and without `skip`.
fn canonical_ids(raw: &[String], skip: Option<Uuid>) -> Result<Vec<String>, ApiError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());
    for r in raw {
        let id = parse_id(r, "member")?;
        if Some(id) != skip && seen.insert(id) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

async fn ensure_users_exist(state: &AppState, ids: &[String]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }

    let wanted = ids.to_vec();
    let found = state.with_db(move |db| db.existing_user_ids(&wanted)).await?;
    if found.len() != ids.len() {
        return Err(ApiError::BadRequest(UNKNOWN_MEMBERS.into()));
    }
    Ok(())
}
