use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;

use errand_db::StoreError;
use errand_db::models::{ErrandRow, NewErrand};
use errand_types::api::{
    AcceptErrandResponse, Claims, CreateErrandRequest, CreateErrandResponse, ErrandListItem,
    ErrandResponse, ErrandStatusResponse,
};
use errand_types::models::Role;

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{caller_role, require_role};

fn to_response(row: ErrandRow) -> ErrandResponse {
    ErrandResponse {
        errand_id: row.id,
        requester_id: row.requester_id,
        requester_name: row.requester_name,
        runner_id: row.runner_id,
        runner_name: row.runner_name,
        task_description: row.task_description,
        collecting_location: row.collecting_location,
        delivery_location: row.delivery_location,
        price: row.price,
        is_accepted: row.is_accepted,
        created_at: row.created_at,
        accepted_at: row.accepted_at,
    }
}

fn non_empty(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

pub async fn create_errand(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateErrandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let collecting_location = non_empty("collecting_location", &req.collecting_location)?;
    let task_description = non_empty("task_description", &req.task_description)?;
    let delivery_location = non_empty("delivery_location", &req.delivery_location)?;
    let price = state.pricing.quote(req.tip)?;

    let errand_id = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Customer], "post errands")?;
        db.create_errand(&NewErrand {
            requester_id: claims.uid,
            task_description: &task_description,
            collecting_location: &collecting_location,
            delivery_location: &delivery_location,
            price,
            created_at: Utc::now(),
        })
        .map_err(ApiError::from)
    })
    .await?;

    info!(errand_id, total = %price.total_price, "Errand posted");
    Ok((StatusCode::CREATED, Json(CreateErrandResponse { errand_id, price })))
}

pub async fn list_errands(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state, |db| db.list_errands()).await?;
    let items: Vec<ErrandListItem> = rows
        .into_iter()
        .map(|row| ErrandListItem {
            errand: to_response(row.errand),
            rating: row.rating.unwrap_or(0),
            rate_notes: row.rate_notes.unwrap_or_default(),
        })
        .collect();
    Ok(Json(items))
}

pub async fn get_errand(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    ApiPath(errand_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| {
        db.get_errand(errand_id)?.ok_or(StoreError::NotFound("errand"))
    })
    .await?;
    Ok(Json(to_response(row)))
}

pub async fn get_status(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    ApiPath(errand_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| {
        db.get_errand(errand_id)?.ok_or(StoreError::NotFound("errand"))
    })
    .await?;
    Ok(Json(ErrandStatusResponse {
        errand_id: row.id,
        is_accepted: row.is_accepted,
        runner_id: row.runner_id,
    }))
}

/// The runner role is checked inside the accept transaction.
pub async fn accept_errand(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(errand_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = blocking(&state, move |db| {
        caller_role(db, &claims)?;
        db.accept_errand(errand_id, claims.uid, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(AcceptErrandResponse {
        errand_id: outcome.errand_id,
        channel_id: outcome.channel_id,
    }))
}
