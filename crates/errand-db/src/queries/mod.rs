pub mod applications;
pub mod archive;
pub mod channels;
pub mod errands;
pub mod ratings;
pub mod remittance;
pub mod users;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use errand_types::models::{display_name, parse_timestamp};

use crate::StoreError;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{raw}'")))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{raw}'")))
    })
    .transpose()
}

/// Text column holding one of our enum names.
pub(crate) fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: T::Err| conversion_error(idx, e.to_string()))
}

pub(crate) fn get_rating(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u8>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(|r| u8::try_from(r).map_err(|_| conversion_error(idx, format!("bad rating {r}"))))
        .transpose()
}

/// Display name from `first_name, last_name, username` at `idx..idx + 3`.
/// `None` when the user was not joined (LEFT JOIN miss).
pub(crate) fn get_name(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    let username: Option<String> = row.get(idx + 2)?;
    Ok(username.map(|username| {
        let first: Option<String> = row.get(idx).ok().flatten();
        let last: Option<String> = row.get(idx + 1).ok().flatten();
        display_name(
            first.as_deref().unwrap_or_default(),
            last.as_deref().unwrap_or_default(),
            &username,
        )
    }))
}
