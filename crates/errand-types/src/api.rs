use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ApplicationStatus, ChannelStatus, HistoryKind, MessageKind, RemittanceStatus, Role};
use crate::pricing::PriceBreakdown;
use crate::week::WeekKey;

// -- Token claims --

/// Claim set carried by a bearer token. Canonical definition shared by the
/// token crate (issue/verify) and the API middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact_number: String,
    pub location: String,
    pub profile_picture: Option<String>,
    /// Only present for runners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPasswordRequest {
    pub new_password: String,
}

// -- Runner applications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerApplicationRequest {
    pub valid_id_1: String,
    pub valid_id_2: String,
    pub police_clearance: String,
    pub barangay_clearance: String,
    pub mode_of_transport: String,
    pub emergency_contact_person: String,
    pub emergency_contact_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunnerApplicationResponse {
    pub application_id: i64,
    pub user_id: i64,
    pub applicant_name: String,
    pub valid_id_1: String,
    pub valid_id_2: String,
    pub police_clearance: String,
    pub barangay_clearance: String,
    pub mode_of_transport: String,
    pub emergency_contact_person: String,
    pub emergency_contact_number: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

// -- Errands --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateErrandRequest {
    #[serde(default)]
    pub collecting_location: String,
    #[serde(default)]
    pub task_description: String,
    #[serde(default)]
    pub delivery_location: String,
    #[serde(default)]
    pub tip: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateErrandResponse {
    pub errand_id: i64,
    #[serde(flatten)]
    pub price: PriceBreakdown,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrandStatusResponse {
    pub errand_id: i64,
    pub is_accepted: bool,
    pub runner_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrandResponse {
    pub errand_id: i64,
    pub requester_id: i64,
    pub requester_name: String,
    pub runner_id: Option<i64>,
    pub runner_name: Option<String>,
    pub task_description: String,
    pub collecting_location: String,
    pub delivery_location: String,
    #[serde(flatten)]
    pub price: PriceBreakdown,
    pub is_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Errand as shown in the broadcast list: the errand plus its most recent
/// rating (0 and empty notes when it has not been rated).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrandListItem {
    #[serde(flatten)]
    pub errand: ErrandResponse,
    pub rating: u8,
    pub rate_notes: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptErrandResponse {
    pub errand_id: i64,
    pub channel_id: i64,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePreview {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: i64,
    pub errand_id: Option<i64>,
    pub customer_id: i64,
    pub runner_id: i64,
    pub other_user_id: i64,
    pub other_user_name: String,
    pub status: ChannelStatus,
    pub rating: Option<u8>,
    pub rate_notes: Option<String>,
    pub latest_message: Option<MessagePreview>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: Uuid,
    pub channel_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArchiveResponse {
    pub channel_id: i64,
    pub history_id: i64,
    pub messages_archived: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateChannelRequest {
    pub rating: i64,
    #[serde(default)]
    pub rate_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateChannelResponse {
    pub channel_id: i64,
    pub errand_id: i64,
    pub runner_id: i64,
    pub customer_id: i64,
    pub rating: u8,
    pub history_id: i64,
}

// -- History --

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub chat_id: i64,
    pub kind: HistoryKind,
    pub errand_id: Option<i64>,
    pub customer_id: i64,
    pub customer_name: String,
    pub runner_id: i64,
    pub status: ChannelStatus,
    pub rating: Option<u8>,
    pub rate_notes: Option<String>,
    pub price: Option<PriceBreakdown>,
    /// Remittance week of the linked errand.
    pub week: Option<WeekKey>,
    pub remitted: RemittanceStatus,
    pub proof: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// -- Remittance --

#[derive(Debug, Serialize, Deserialize)]
pub struct WeeklyRemittance {
    pub runner_id: i64,
    pub runner_name: String,
    pub week: WeekKey,
    /// Earliest errand in the group.
    pub week_start: DateTime<Utc>,
    /// Latest errand in the group.
    pub week_end: DateTime<Utc>,
    pub errand_count: u32,
    /// Service charges owed to the platform.
    pub total_remittance: Decimal,
    /// Base prices earned by the runner.
    pub total_earnings: Decimal,
    pub status: RemittanceStatus,
    pub proof: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitProofRequest {
    pub proof_ref: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemittanceRecordResponse {
    pub runner_id: i64,
    pub week: WeekKey,
    pub status: RemittanceStatus,
    pub proof: Option<String>,
}
