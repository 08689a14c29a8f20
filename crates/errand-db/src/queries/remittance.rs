use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row};
use tracing::info;

use errand_types::models::{RemittanceStatus, format_timestamp};
use errand_types::week::WeekKey;

use crate::models::{LedgerEntry, RemittanceRow, WeeklyRemittanceRow};
use crate::queries::{OptionalExt, get_name, get_opt_ts, get_parsed, get_ts};
use crate::{Database, StoreError};

impl Database {
    /// Per (runner, ISO week) totals over accepted errands, newest week
    /// first, then by runner id. `runner_id` narrows to one runner.
    pub fn weekly_summary(&self, runner_id: Option<i64>) -> Result<Vec<WeeklyRemittanceRow>, StoreError> {
        self.with_conn(|conn| {
            let entries = ledger_entries(conn, runner_id)?;
            let records = remittance_records(conn, runner_id)?;
            Ok(summarize(&entries, &records))
        })
    }

    pub fn get_remittance(&self, runner_id: i64, week: WeekKey) -> Result<Option<RemittanceRow>, StoreError> {
        self.with_conn(|conn| query_remittance(conn, runner_id, week))
    }

    /// Attach proof of payment to a runner's week. Not Yet and Pending both
    /// move to Pending (a resubmission replaces the proof).
    pub fn submit_proof(
        &self,
        runner_id: i64,
        week: WeekKey,
        proof_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<RemittanceRow, StoreError> {
        self.with_tx(|conn| {
            if errands_in_week(conn, runner_id, week)? == 0 {
                return Err(StoreError::NotFound("remittance week"));
            }

            match query_remittance(conn, runner_id, week)? {
                Some(existing) if existing.status == RemittanceStatus::Remitted => {
                    return Err(StoreError::conflict(format!("week {week} is already remitted")));
                }
                Some(_) => {
                    conn.execute(
                        "UPDATE remittances SET proof_ref = ?1, submitted_at = ?2
                         WHERE runner_id = ?3 AND week = ?4",
                        rusqlite::params![proof_ref, format_timestamp(now), runner_id, week.to_string()],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO remittances (runner_id, week, status, proof_ref, submitted_at)
                         VALUES (?1, ?2, 'Pending', ?3, ?4)",
                        rusqlite::params![runner_id, week.to_string(), proof_ref, format_timestamp(now)],
                    )?;
                }
            }

            info!(runner_id, %week, "remittance proof submitted");
            query_remittance(conn, runner_id, week)?.ok_or(StoreError::NotFound("remittance week"))
        })
    }

    /// Confirm a Pending week. Anything else is a `Conflict`.
    pub fn mark_remitted(
        &self,
        runner_id: i64,
        week: WeekKey,
        now: DateTime<Utc>,
    ) -> Result<RemittanceRow, StoreError> {
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE remittances SET status = 'Remitted', reviewed_at = ?1
                 WHERE runner_id = ?2 AND week = ?3 AND status = 'Pending'",
                rusqlite::params![format_timestamp(now), runner_id, week.to_string()],
            )?;
            if changed == 0 {
                return Err(match query_remittance(conn, runner_id, week)? {
                    Some(_) => StoreError::conflict(format!("week {week} is already remitted")),
                    None => StoreError::conflict(format!("no proof submitted for week {week}")),
                });
            }

            info!(runner_id, %week, "remittance confirmed");
            query_remittance(conn, runner_id, week)?.ok_or(StoreError::NotFound("remittance week"))
        })
    }
}

/// Fold ledger entries into weekly rows and attach the stored status.
/// Every entry lands in exactly one (runner, week) group.
pub fn summarize(entries: &[LedgerEntry], records: &[RemittanceRow]) -> Vec<WeeklyRemittanceRow> {
    let stored: HashMap<(i64, WeekKey), &RemittanceRow> =
        records.iter().map(|r| ((r.runner_id, r.week), r)).collect();

    let mut groups: BTreeMap<(Reverse<WeekKey>, i64), WeeklyRemittanceRow> = BTreeMap::new();
    for entry in entries {
        let week = WeekKey::of(entry.created_at);
        groups
            .entry((Reverse(week), entry.runner_id))
            .and_modify(|row| {
                row.errand_count += 1;
                row.total_remittance_cents += entry.service_charge_cents;
                row.total_earnings_cents += entry.base_price_cents;
                row.first_errand_at = row.first_errand_at.min(entry.created_at);
                row.last_errand_at = row.last_errand_at.max(entry.created_at);
            })
            .or_insert_with(|| WeeklyRemittanceRow {
                runner_id: entry.runner_id,
                runner_name: entry.runner_name.clone(),
                week,
                first_errand_at: entry.created_at,
                last_errand_at: entry.created_at,
                errand_count: 1,
                total_remittance_cents: entry.service_charge_cents,
                total_earnings_cents: entry.base_price_cents,
                status: RemittanceStatus::NotYet,
                proof_ref: None,
            });
    }

    groups
        .into_values()
        .map(|mut row| {
            if let Some(record) = stored.get(&(row.runner_id, row.week)) {
                row.status = record.status;
                row.proof_ref = Some(record.proof_ref.clone());
            }
            row
        })
        .collect()
}

fn ledger_entries(conn: &Connection, runner_id: Option<i64>) -> Result<Vec<LedgerEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT e.runner_id, e.created_at, e.service_charge_cents, e.base_price_cents,
                r.first_name, r.last_name, r.username
         FROM errands e
         LEFT JOIN users r ON e.runner_id = r.id
         WHERE e.runner_id IS NOT NULL AND (?1 IS NULL OR e.runner_id = ?1)",
    )?;
    let rows = stmt
        .query_map([runner_id], |row| {
            let runner_id: i64 = row.get(0)?;
            Ok(LedgerEntry {
                runner_id,
                created_at: get_ts(row, 1)?,
                service_charge_cents: row.get(2)?,
                base_price_cents: row.get(3)?,
                runner_name: get_name(row, 4)?.unwrap_or_else(|| format!("user {runner_id}")),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn remittance_records(conn: &Connection, runner_id: Option<i64>) -> Result<Vec<RemittanceRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT runner_id, week, status, proof_ref, submitted_at, reviewed_at
         FROM remittances WHERE ?1 IS NULL OR runner_id = ?1",
    )?;
    let rows = stmt
        .query_map([runner_id], map_remittance)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_remittance(
    conn: &Connection,
    runner_id: i64,
    week: WeekKey,
) -> Result<Option<RemittanceRow>, StoreError> {
    conn.query_row(
        "SELECT runner_id, week, status, proof_ref, submitted_at, reviewed_at
         FROM remittances WHERE runner_id = ?1 AND week = ?2",
        rusqlite::params![runner_id, week.to_string()],
        map_remittance,
    )
    .optional()
}

/// Accepted errands of the runner created inside the week. Stored
/// timestamps are fixed-width UTC, so a string range is a time range.
fn errands_in_week(conn: &Connection, runner_id: i64, week: WeekKey) -> Result<i64, StoreError> {
    let start = week
        .first_day()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .ok_or_else(|| StoreError::invalid(format!("week {week} is out of range")))?;
    let end = start + Duration::days(7);

    let count = conn.query_row(
        "SELECT COUNT(*) FROM errands
         WHERE runner_id = ?1 AND created_at >= ?2 AND created_at < ?3",
        rusqlite::params![runner_id, format_timestamp(start), format_timestamp(end)],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn map_remittance(row: &Row<'_>) -> rusqlite::Result<RemittanceRow> {
    Ok(RemittanceRow {
        runner_id: row.get(0)?,
        week: get_parsed(row, 1)?,
        status: get_parsed(row, 2)?,
        proof_ref: row.get(3)?,
        submitted_at: get_ts(row, 4)?,
        reviewed_at: get_opt_ts(row, 5)?,
    })
}
