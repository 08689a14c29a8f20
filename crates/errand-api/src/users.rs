use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use errand_db::Database;
use errand_db::models::{ProfileUpdate, UserRow};
use errand_types::api::{Claims, ProfileResponse, SetPasswordRequest, UpdateProfileRequest};
use errand_types::models::Role;

use crate::auth::{AppState, blocking, hash_password};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{caller_role, require_role};

fn profile(db: &Database, user: UserRow) -> Result<ProfileResponse, ApiError> {
    let average_rating = match user.role {
        Role::Runner => db.average_rating(user.id)?,
        _ => None,
    };
    Ok(ProfileResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        contact_number: user.contact_number,
        location: user.location,
        profile_picture: user.profile_picture,
        average_rating,
        created_at: user.created_at,
    })
}

fn profile_update(req: &UpdateProfileRequest) -> ProfileUpdate<'_> {
    ProfileUpdate {
        first_name: req.first_name.trim(),
        last_name: req.last_name.trim(),
        email: req.email.trim(),
        contact_number: req.contact_number.trim(),
        location: req.location.trim(),
        profile_picture: req.profile_picture.as_deref(),
    }
}

fn load_profile(db: &Database, user_id: i64) -> Result<ProfileResponse, ApiError> {
    let user = db
        .get_user_by_id(user_id)?
        .ok_or(ApiError::Unauthenticated("unknown user"))?;
    profile(db, user)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |db| load_profile(db, claims.uid)).await?;
    Ok(Json(profile))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |db| {
        caller_role(db, &claims)?;
        db.update_profile(claims.uid, &profile_update(&req))?;
        load_profile(db, claims.uid)
    })
    .await?;

    info!(user_id = profile.user_id, "Profile updated");
    Ok(Json(profile))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "list users")?;
        db.list_users()?
            .into_iter()
            .map(|user| profile(db, user))
            .collect::<Result<Vec<_>, ApiError>>()
    })
    .await?;
    Ok(Json(users))
}

/// Admin edit of another account's profile fields. The role stays as is.
pub async fn edit_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin_id = claims.uid;
    let profile = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "edit users")?;
        db.update_profile(user_id, &profile_update(&req))?;
        let user = db
            .get_user_by_id(user_id)?
            .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
        profile(db, user)
    })
    .await?;

    info!(user_id, admin_id, "User edited by admin");
    Ok(Json(profile))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(req): ApiJson<SetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin_id = claims.uid;
    blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "reset passwords")?;
        if req.new_password.chars().count() < 8 {
            return Err(ApiError::validation("new_password must be at least 8 characters"));
        }
        let password_hash = hash_password(&req.new_password)?;
        db.set_password(user_id, &password_hash).map_err(ApiError::from)
    })
    .await?;

    info!(user_id, admin_id, "Password reset by admin");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "delete users")?;
        if user_id == claims.uid {
            return Err(ApiError::validation("admins cannot delete their own account"));
        }
        db.delete_user(user_id).map_err(ApiError::from)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
