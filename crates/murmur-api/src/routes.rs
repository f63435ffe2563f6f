use axum::{
    Json, Router, middleware,
    routing::{delete, get, patch, post, put},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, channels, messages, socket, users};

/// The full `/api` surface. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/socket", get(socket::socket_upgrade))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/update-profile", put(auth::update_profile))
        .route("/users", get(users::list_users))
        .route("/users/me", get(users::me))
        .route("/channels", get(channels::list_channels))
        .route("/channels/create", post(channels::create_channel))
        .route(
            "/channels/{id}",
            patch(channels::update_channel).delete(channels::delete_channel),
        )
        .route("/channels/{id}/members", post(channels::add_members))
        .route("/channels/{id}/members/{member_id}", delete(channels::remove_member))
        .route("/messages/{id}", get(messages::get_messages))
        .route("/messages/send/{id}", post(messages::send_message))
        .route("/messages/channel/{id}", get(messages::get_channel_messages))
        .route("/messages/send/channel/{id}", post(messages::send_channel_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
