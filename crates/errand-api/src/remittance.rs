use std::collections::HashMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::info;

use errand_db::Database;
use errand_db::models::{RemittanceRow, WeeklyRemittanceRow};
use errand_types::api::{
    Claims, HistoryEntry, RemittanceRecordResponse, SubmitProofRequest, WeeklyRemittance,
};
use errand_types::models::{RemittanceStatus, Role};
use errand_types::pricing::cents_to_decimal;
use errand_types::week::WeekKey;

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{caller_role, require_role};

/// Rows the caller may see: admins every runner, runners only their own.
fn ledger_scope(db: &Database, claims: &Claims) -> Result<Option<i64>, ApiError> {
    match caller_role(db, claims)? {
        Role::Admin => Ok(None),
        Role::Runner => Ok(Some(claims.uid)),
        Role::Customer => Err(ApiError::unauthorized("customer accounts have no remittance ledger")),
    }
}

fn to_weekly(row: WeeklyRemittanceRow) -> WeeklyRemittance {
    WeeklyRemittance {
        runner_id: row.runner_id,
        runner_name: row.runner_name,
        week: row.week,
        week_start: row.first_errand_at,
        week_end: row.last_errand_at,
        errand_count: row.errand_count,
        total_remittance: cents_to_decimal(row.total_remittance_cents),
        total_earnings: cents_to_decimal(row.total_earnings_cents),
        status: row.status,
        proof: row.proof_ref,
    }
}

fn to_record(row: RemittanceRow) -> RemittanceRecordResponse {
    RemittanceRecordResponse {
        runner_id: row.runner_id,
        week: row.week,
        status: row.status,
        proof: Some(row.proof_ref),
    }
}

pub async fn weekly_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state, move |db| {
        let scope = ledger_scope(db, &claims)?;
        db.weekly_summary(scope).map_err(ApiError::from)
    })
    .await?;
    Ok(Json(rows.into_iter().map(to_weekly).collect::<Vec<_>>()))
}

pub async fn submit_proof(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(week): ApiPath<String>,
    ApiJson(req): ApiJson<SubmitProofRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let week: WeekKey = week.parse()?;
    let proof_ref = req.proof_ref.trim().to_string();
    if proof_ref.is_empty() {
        return Err(ApiError::validation("proof_ref must not be empty"));
    }

    let row = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Runner], "submit remittance proof")?;
        db.submit_proof(claims.uid, week, &proof_ref, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;

    info!(runner_id = row.runner_id, week = %row.week, "Remittance proof received");
    Ok(Json(to_record(row)))
}

pub async fn mark_remitted(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath((runner_id, week)): ApiPath<(i64, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let week: WeekKey = week.parse()?;

    let row = blocking(&state, move |db| {
        require_role(caller_role(db, &claims)?, &[Role::Admin], "confirm remittances")?;
        db.mark_remitted(runner_id, week, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(to_record(row)))
}

/// Archived and rated conversations with the remittance state of the
/// errand's week.
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (rows, weeks) = blocking(&state, move |db| {
        let scope = ledger_scope(db, &claims)?;
        let rows = db.list_history(scope)?;
        let weeks = db.weekly_summary(scope)?;
        Ok::<_, ApiError>((rows, weeks))
    })
    .await?;

    let status: HashMap<(i64, WeekKey), (RemittanceStatus, Option<String>)> = weeks
        .into_iter()
        .map(|w| ((w.runner_id, w.week), (w.status, w.proof_ref)))
        .collect();

    let entries: Vec<HistoryEntry> = rows
        .into_iter()
        .map(|row| {
            let week = row.errand_created_at.map(WeekKey::of);
            let (remitted, proof) = week
                .and_then(|week| status.get(&(row.runner_id, week)).cloned())
                .unwrap_or((RemittanceStatus::NotYet, None));
            HistoryEntry {
                history_id: row.id,
                chat_id: row.chat_id,
                kind: row.kind,
                errand_id: row.errand_id,
                customer_id: row.customer_id,
                customer_name: row.customer_name,
                runner_id: row.runner_id,
                status: row.status,
                rating: row.rating,
                rate_notes: row.rate_notes,
                price: row.price,
                week,
                remitted,
                proof,
                recorded_at: row.recorded_at,
            }
        })
        .collect();

    Ok(Json(entries))
}
