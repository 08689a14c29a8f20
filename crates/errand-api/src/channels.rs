use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use errand_db::Database;
use errand_db::models::{ChannelSummaryRow, MessageRow, NewMessage, Participants};
use errand_types::api::{
    ChannelSummary, Claims, MessagePreview, MessageResponse, SendMessageRequest,
};
use errand_types::models::{MessageKind, Role};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::caller_role;

/// Participants may act on their channel; admins may too when `admin_ok`.
pub(crate) fn check_participant(
    db: &Database,
    claims: &Claims,
    participants: &Participants,
    admin_ok: bool,
) -> Result<(), ApiError> {
    if participants.contains(claims.uid) {
        return Ok(());
    }
    if admin_ok && caller_role(db, claims)? == Role::Admin {
        return Ok(());
    }
    Err(ApiError::unauthorized("not a participant of this channel"))
}

fn to_summary(row: ChannelSummaryRow) -> ChannelSummary {
    ChannelSummary {
        channel_id: row.channel.id,
        errand_id: row.channel.errand_id,
        customer_id: row.channel.customer_id,
        runner_id: row.channel.runner_id,
        other_user_id: row.other_user_id,
        other_user_name: row.other_user_name,
        status: row.channel.status,
        rating: row.channel.rating,
        rate_notes: row.channel.rate_notes,
        latest_message: row.latest_message.map(|m| MessagePreview {
            kind: m.kind,
            content: m.content,
            attachment: m.attachment,
            created_at: m.created_at,
        }),
    }
}

fn to_message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        message_id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::nil()
        }),
        channel_id: row.channel_id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        kind: row.kind,
        content: row.content,
        attachment: row.attachment,
        created_at: row.created_at,
    }
}

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state, move |db| db.list_channels_for(claims.uid)).await?;
    Ok(Json(rows.into_iter().map(to_summary).collect::<Vec<_>>()))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(channel_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state, move |db| {
        let channel = db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;
        let participants = Participants {
            customer_id: channel.customer_id,
            runner_id: channel.runner_id,
        };
        check_participant(db, &claims, &participants, true)?;
        db.list_messages(channel_id).map_err(ApiError::from)
    })
    .await?;
    Ok(Json(rows.into_iter().map(to_message).collect::<Vec<_>>()))
}

/// Persist a message. Delivery to the other participant is not done here.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(channel_id): ApiPath<i64>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let attachment = req.attachment.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let (content, attachment) = match (req.kind, content, attachment) {
        (MessageKind::Text, Some(content), _) => (Some(content.to_string()), None),
        (MessageKind::Text, None, _) => {
            return Err(ApiError::validation("text messages need content"));
        }
        (MessageKind::Image, _, Some(attachment)) => {
            (content.map(str::to_string), Some(attachment.to_string()))
        }
        (MessageKind::Image, _, None) => {
            return Err(ApiError::validation("image messages need an attachment"));
        }
    };
    let kind = req.kind;

    let row = blocking(&state, move |db| {
        let channel = db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;
        if !channel.has_participant(claims.uid) {
            return Err(ApiError::unauthorized("not a participant of this channel"));
        }
        db.insert_message(&NewMessage {
            channel_id,
            sender_id: claims.uid,
            kind,
            content: content.as_deref(),
            attachment: attachment.as_deref(),
            created_at: Utc::now(),
        })
        .map_err(ApiError::from)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(to_message(row))))
}
