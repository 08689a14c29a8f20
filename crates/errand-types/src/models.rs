use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Runner,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Runner => "runner",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "runner" => Ok(Self::Runner),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name shown to the other side of a conversation. Falls back to the
/// username when the profile has no first/last name yet.
pub fn display_name(first_name: &str, last_name: &str, username: &str) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if full.is_empty() {
        username.to_string()
    } else {
        full.to_string()
    }
}

// -- Runner applications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant::new("application status", other)),
        }
    }
}

// -- Channels --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Done,
}

impl ChannelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
        }
    }
}

impl FromStr for ChannelStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            other => Err(UnknownVariant::new("channel status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl FromStr for MessageKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(UnknownVariant::new("message kind", other)),
        }
    }
}

// -- History --

/// Why a history row was written. Archive rows are the frozen copy of a
/// channel; rating rows record a rating event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Archive,
    Rating,
}

impl HistoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Rating => "rating",
        }
    }
}

impl FromStr for HistoryKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(Self::Archive),
            "rating" => Ok(Self::Rating),
            other => Err(UnknownVariant::new("history kind", other)),
        }
    }
}

// -- Remittance --

/// Absence of a stored remittance record means `NotYet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemittanceStatus {
    #[serde(rename = "Not Yet")]
    NotYet,
    Pending,
    Remitted,
}

impl RemittanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotYet => "Not Yet",
            Self::Pending => "Pending",
            Self::Remitted => "Remitted",
        }
    }
}

impl FromStr for RemittanceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Yet" => Ok(Self::NotYet),
            "Pending" => Ok(Self::Pending),
            "Remitted" => Ok(Self::Remitted),
            other => Err(UnknownVariant::new("remittance status", other)),
        }
    }
}

// -- Timestamps --

/// Timestamps are stored as fixed-width RFC 3339 strings (millisecond
/// precision, `Z` suffix) so lexical order equals chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        // SQLite's datetime('now') has no timezone; treat as UTC.
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(display_name("Ana", "Reyes", "ana"), "Ana Reyes");
        assert_eq!(display_name("Ana", "", "ana"), "Ana");
        assert_eq!(display_name("  ", "", "ana"), "ana");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("runner".parse::<Role>().unwrap(), Role::Runner);
        assert!("user".parse::<Role>().is_err());
    }

    #[test]
    fn test_remittance_status_wire_names() {
        let json = serde_json::to_string(&RemittanceStatus::NotYet).unwrap();
        assert_eq!(json, "\"Not Yet\"");
        assert_eq!(
            "Pending".parse::<RemittanceStatus>().unwrap(),
            RemittanceStatus::Pending
        );
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 11, 5, 9, 0, 0).unwrap();
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(parse_timestamp(&format_timestamp(a)), Some(a));
    }

    #[test]
    fn test_parse_sqlite_timestamp() {
        let parsed = parse_timestamp("2026-03-02 10:11:12").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 2, 10, 11, 12).unwrap());
    }
}
