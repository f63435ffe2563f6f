use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::auth::SESSION_COOKIE;
use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the session token to an account and attach it as an
/// `Extension<User>` for the handlers behind this layer.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized - No Token Provided".into()))?;

    let claims = state
        .auth
        .verify_token(&token)
        .map_err(|_| ApiError::Unauthorized("Unauthorized - Invalid Token".into()))?;

    let id = claims.sub.to_string();
    let user = state
        .with_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?
        .into_user()?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// The `jwt` cookie, falling back to `Authorization: Bearer` for non-browser callers.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(bearer)| bearer.token().to_string())
}
