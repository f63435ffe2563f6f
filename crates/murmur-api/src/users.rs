use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use murmur_types::models::User;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive substring of the name; blank means no filter.
    pub search: Option<String>,
}

/// GET /users
///
/// Everyone except the caller.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let my_id = me.id.to_string();
    let users = state
        .with_db(move |db| {
            db.list_users(&my_id, query.search.as_deref())?
                .into_iter()
                .map(|row| row.into_user())
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

    Ok(Json(users))
}

/// GET /users/me
pub async fn me(Extension(me): Extension<User>) -> Json<User> {
    Json(me)
}
