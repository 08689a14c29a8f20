//! Database row types. These map directly to SQLite rows and are distinct
//! from the `errand-types` API models to keep the DB layer independent of
//! the wire format.

use chrono::{DateTime, Utc};
use errand_types::models::{
    ApplicationStatus, ChannelStatus, HistoryKind, MessageKind, RemittanceStatus, Role, display_name,
};
use errand_types::pricing::PriceBreakdown;
use errand_types::week::WeekKey;

// -- Users --

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact_number: String,
    pub location: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ProfileUpdate<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub contact_number: &'a str,
    pub location: &'a str,
    pub profile_picture: Option<&'a str>,
}

// -- Runner applications --

#[derive(Debug)]
pub struct ApplicationRow {
    pub id: i64,
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

#[derive(Debug)]
pub struct NewApplication<'a> {
    pub valid_id_1: &'a str,
    pub valid_id_2: &'a str,
    pub police_clearance: &'a str,
    pub barangay_clearance: &'a str,
    pub mode_of_transport: &'a str,
    pub emergency_contact_person: &'a str,
    pub emergency_contact_number: &'a str,
}

// -- Errands --

#[derive(Debug)]
pub struct ErrandRow {
    pub id: i64,
    pub requester_id: i64,
    pub requester_name: String,
    pub runner_id: Option<i64>,
    pub runner_name: Option<String>,
    pub task_description: String,
    pub collecting_location: String,
    pub delivery_location: String,
    pub price: PriceBreakdown,
    pub is_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Errand plus the newest rating recorded against it.
#[derive(Debug)]
pub struct ErrandListRow {
    pub errand: ErrandRow,
    pub rating: Option<u8>,
    pub rate_notes: Option<String>,
}

#[derive(Debug)]
pub struct NewErrand<'a> {
    pub requester_id: i64,
    pub task_description: &'a str,
    pub collecting_location: &'a str,
    pub delivery_location: &'a str,
    pub price: PriceBreakdown,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub errand_id: i64,
    pub channel_id: i64,
    pub requester_id: i64,
}

// -- Channels --

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: i64,
    pub customer_id: i64,
    pub runner_id: i64,
    pub errand_id: Option<i64>,
    pub status: ChannelStatus,
    pub rating: Option<u8>,
    pub rate_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelRow {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.customer_id == user_id || self.runner_id == user_id
    }
}

#[derive(Debug)]
pub struct MessagePreviewRow {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ChannelSummaryRow {
    pub channel: ChannelRow,
    pub other_user_id: i64,
    pub other_user_name: String,
    pub latest_message: Option<MessagePreviewRow>,
}

/// The two users of a channel, live or archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participants {
    pub customer_id: i64,
    pub runner_id: i64,
}

impl Participants {
    pub fn contains(&self, user_id: i64) -> bool {
        self.customer_id == user_id || self.runner_id == user_id
    }
}

// -- Messages --

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewMessage<'a> {
    pub channel_id: i64,
    pub sender_id: i64,
    pub kind: MessageKind,
    pub content: Option<&'a str>,
    pub attachment: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

// -- History --

#[derive(Debug)]
pub struct HistoryRow {
    pub id: i64,
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
    pub errand_created_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub history_id: i64,
    pub messages_archived: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingOutcome {
    pub history_id: i64,
    pub errand_id: i64,
    pub runner_id: i64,
    pub customer_id: i64,
}

// -- Remittance --

/// One errand's contribution to the ledger.
#[derive(Debug)]
pub struct LedgerEntry {
    pub runner_id: i64,
    pub runner_name: String,
    pub created_at: DateTime<Utc>,
    pub service_charge_cents: i64,
    pub base_price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct RemittanceRow {
    pub runner_id: i64,
    pub week: WeekKey,
    pub status: RemittanceStatus,
    pub proof_ref: String,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyRemittanceRow {
    pub runner_id: i64,
    pub runner_name: String,
    pub week: WeekKey,
    pub first_errand_at: DateTime<Utc>,
    pub last_errand_at: DateTime<Utc>,
    pub errand_count: u32,
    pub total_remittance_cents: i64,
    pub total_earnings_cents: i64,
    pub status: RemittanceStatus,
    pub proof_ref: Option<String>,
}
