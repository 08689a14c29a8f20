use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use errand_db::models::Participants;
use errand_types::api::{ArchiveResponse, Claims};

use crate::auth::{AppState, blocking};
use crate::channels::check_participant;
use crate::error::ApiError;
use crate::extract::ApiPath;

/// Mark a channel done: the channel and its transcript move into history.
pub async fn done(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(channel_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = blocking(&state, move |db| {
        let channel = db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;
        let participants = Participants {
            customer_id: channel.customer_id,
            runner_id: channel.runner_id,
        };
        check_participant(db, &claims, &participants, true)?;
        db.archive_channel(channel_id, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(ArchiveResponse {
        channel_id,
        history_id: outcome.history_id,
        messages_archived: outcome.messages_archived,
    }))
}
