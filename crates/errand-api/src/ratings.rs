use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use errand_types::api::{Claims, RateChannelRequest, RateChannelResponse};

use crate::auth::{AppState, blocking};
use crate::channels::check_participant;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};

/// Rate the errand behind a channel, live or already archived.
pub async fn rate_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(channel_id): ApiPath<i64>,
    ApiJson(req): ApiJson<RateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rating = u8::try_from(req.rating)
        .ok()
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ApiError::validation("rating must be an integer from 1 to 5"))?;
    let notes = req.rate_notes.unwrap_or_default().trim().to_string();

    let outcome = blocking(&state, move |db| {
        let participants = db
            .channel_participants(channel_id)?
            .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;
        check_participant(db, &claims, &participants, true)?;
        db.rate_channel(channel_id, rating, &notes, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(RateChannelResponse {
        channel_id,
        errand_id: outcome.errand_id,
        runner_id: outcome.runner_id,
        customer_id: outcome.customer_id,
        rating,
        history_id: outcome.history_id,
    }))
}
