use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use murmur_db::queries::is_constraint_violation;
use murmur_types::api::{Claims, LoginRequest, SignupRequest, StatusResponse, UpdateProfileRequest};
use murmur_types::models::User;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::ValidatedJson;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

const TOKEN_TTL_DAYS: i64 = 7;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const EMAIL_TAKEN: &str = "User with this email already exists";

/// Token signing and cookie policy.
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Mark the session cookie `Secure`. Off only for local development over plain HTTP.
    pub secure_cookies: bool,
}

impl AuthConfig {
    pub fn issue_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp() as usize,
            exp: (now + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Checks signature and expiry.
    pub fn verify_token(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }

    fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure_cookies)
            .path("/")
            .max_age(time::Duration::days(TOKEN_TTL_DAYS))
            .build()
    }

    fn cleared_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure_cookies)
            .path("/")
            .max_age(time::Duration::ZERO)
            .build()
    }
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.clone();
    if state.with_db(move |db| db.get_user_by_email(&email)).await?.is_some() {
        return Err(ApiError::field("email", "email_taken", EMAIL_TAKEN));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let id = user_id.to_string();
    let created = state
        .with_db(move |db| db.create_user(&id, &req.full_name, &req.email, &password_hash))
        .await;

    let user = match created {
        Ok(row) => row.into_user()?,
        // Lost a race with a concurrent signup for the same email
        Err(ApiError::Internal(e)) if is_constraint_violation(&e) => {
            return Err(ApiError::field("email", "email_taken", EMAIL_TAKEN));
        }
        Err(e) => return Err(e),
    };

    let token = state.auth.issue_token(user_id)?;
    info!("account {} created", user_id);

    Ok((StatusCode::CREATED, jar.add(state.auth.session_cookie(token)), Json(user)))
}

/// POST /auth/login
///
/// Unknown email and wrong password get the same 400 so the response never
/// reveals whether an account exists.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.clone();
    let row = state
        .with_db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::BadRequest(INVALID_CREDENTIALS.into()))?;

    let parsed_hash =
        PasswordHash::new(&row.password).map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::BadRequest(INVALID_CREDENTIALS.into()))?;

    let user = row.into_user()?;
    let token = state.auth.issue_token(user.id)?;

    Ok((jar.add(state.auth.session_cookie(token)), Json(user)))
}

/// POST /auth/logout
///
/// Expires the session cookie. Needs no valid session.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(state.auth.cleared_cookie()),
        Json(StatusResponse::new("Logged out successfully")),
    )
}

/// PUT /auth/update-profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let id = me.id.to_string();
    let row = state
        .with_db(move |db| db.update_profile(&id, &req.full_name, req.profile_pic.as_deref()))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(row.into_user()?))
}
