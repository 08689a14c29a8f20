use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::{error, info};

use errand_db::models::NewUser;
use errand_db::Database;
use errand_token::TokenVerifier;
use errand_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use errand_types::models::Role;
use errand_types::pricing::Pricing;

use crate::error::ApiError;
use crate::extract::ApiJson;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub verifier: TokenVerifier,
    pub pricing: Pricing,
}

/// Run a blocking store call off the async runtime.
pub(crate) async fn blocking<F, T, E>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(Into::into)
}

/// Argon2id PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored: &str) -> Result<(), ApiError> {
    let parsed_hash = PasswordHash::new(stored)
        .map_err(|e| ApiError::Internal(format!("stored password hash unreadable: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated("invalid credentials"))
}

fn issue_token(state: &AppState, user_id: i64, username: &str) -> Result<String, ApiError> {
    state
        .verifier
        .issue(user_id, username)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::validation("username must be 3 to 32 characters"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let token_name = username.clone();
    let user_id = blocking(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        db.create_user(&NewUser {
            username: &username,
            password_hash: &password_hash,
            role: Role::Customer,
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            email: req.email.trim(),
            created_at: Utc::now(),
        })
        .map_err(ApiError::from)
    })
    .await?;

    let token = issue_token(&state, user_id, &token_name)?;
    info!(user_id, "User registered");

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let user = blocking(&state, move |db| {
        let user = db
            .get_user_by_username(&username)?
            .ok_or(ApiError::Unauthenticated("invalid credentials"))?;
        verify_password(&req.password, &user.password)?;
        Ok::<_, ApiError>(user)
    })
    .await?;

    let token = issue_token(&state, user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        token,
    }))
}
