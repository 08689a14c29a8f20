use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use errand_db::models::{ApplicationRow, NewApplication};
use errand_types::api::{Claims, RunnerApplicationRequest, RunnerApplicationResponse};
use errand_types::models::Role;

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{caller_role, require_role};

fn to_response(row: ApplicationRow) -> RunnerApplicationResponse {
    RunnerApplicationResponse {
        application_id: row.id,
        user_id: row.user_id,
        applicant_name: row.applicant_name,
        valid_id_1: row.valid_id_1,
        valid_id_2: row.valid_id_2,
        police_clearance: row.police_clearance,
        barangay_clearance: row.barangay_clearance,
        mode_of_transport: row.mode_of_transport,
        emergency_contact_person: row.emergency_contact_person,
        emergency_contact_number: row.emergency_contact_number,
        status: row.status,
        created_at: row.created_at,
        reviewed_at: row.reviewed_at,
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(value)
}

pub async fn apply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RunnerApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| {
        let application = NewApplication {
            valid_id_1: required("valid_id_1", &req.valid_id_1)?,
            valid_id_2: required("valid_id_2", &req.valid_id_2)?,
            police_clearance: required("police_clearance", &req.police_clearance)?,
            barangay_clearance: required("barangay_clearance", &req.barangay_clearance)?,
            mode_of_transport: required("mode_of_transport", &req.mode_of_transport)?,
            emergency_contact_person: required(
                "emergency_contact_person",
                &req.emergency_contact_person,
            )?,
            emergency_contact_number: required(
                "emergency_contact_number",
                &req.emergency_contact_number,
            )?,
        };
        db.create_application(claims.uid, &application, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(to_response(row))))
}

pub async fn list_applications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "review runner applications")?;
        db.list_applications().map_err(ApiError::from)
    })
    .await?;
    Ok(Json(rows.into_iter().map(to_response).collect::<Vec<_>>()))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(application_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "review runner applications")?;
        db.approve_application(application_id, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(to_response(row)))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(application_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "review runner applications")?;
        db.reject_application(application_id, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(to_response(row)))
}
