use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::info;

use errand_types::models::{ChannelStatus, HistoryKind, format_timestamp};
use errand_types::pricing::PriceBreakdown;

use crate::models::{ArchiveOutcome, HistoryRow};
use crate::queries::channels::query_channel;
use crate::queries::{OptionalExt, get_name, get_opt_ts, get_parsed, get_rating, get_ts};
use crate::{Database, StoreError};

/// One `chat_history` row to append.
pub(crate) struct HistoryInsert<'a> {
    pub chat_id: i64,
    pub kind: HistoryKind,
    pub errand_id: Option<i64>,
    pub customer_id: i64,
    pub runner_id: i64,
    pub status: ChannelStatus,
    pub rating: Option<u8>,
    pub rate_notes: Option<&'a str>,
    pub channel_created_at: Option<DateTime<Utc>>,
    pub channel_updated_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

impl Database {
    /// Move a live channel and its transcript into history. Either every
    /// step lands or none does.
    pub fn archive_channel(
        &self,
        channel_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ArchiveOutcome, StoreError> {
        self.with_tx(|conn| {
            let channel = query_channel(conn, channel_id)?.ok_or(StoreError::NotFound("channel"))?;

            let history_id = insert_history(
                conn,
                &HistoryInsert {
                    chat_id: channel.id,
                    kind: HistoryKind::Archive,
                    errand_id: channel.errand_id,
                    customer_id: channel.customer_id,
                    runner_id: channel.runner_id,
                    status: ChannelStatus::Done,
                    rating: channel.rating,
                    rate_notes: channel.rate_notes.as_deref(),
                    channel_created_at: Some(channel.created_at),
                    channel_updated_at: Some(channel.updated_at),
                    recorded_at: now,
                },
            )?;

            let messages_archived = conn.execute(
                "INSERT INTO messages_history
                    (id, channel_id, sender_id, kind, content, attachment, created_at, archived_at)
                 SELECT id, channel_id, sender_id, kind, content, attachment, created_at, ?2
                 FROM messages WHERE channel_id = ?1",
                rusqlite::params![channel_id, format_timestamp(now)],
            )?;
            conn.execute("DELETE FROM messages WHERE channel_id = ?1", [channel_id])?;
            conn.execute("DELETE FROM channels WHERE id = ?1", [channel_id])?;

            info!(channel_id, history_id, messages_archived, "channel archived");
            Ok(ArchiveOutcome {
                history_id,
                messages_archived,
            })
        })
    }

    /// History rows, newest first. `runner_id` narrows to one runner.
    pub fn list_history(&self, runner_id: Option<i64>) -> Result<Vec<HistoryRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.id, h.chat_id, h.kind, h.errand_id, h.customer_id, h.runner_id,
                        h.status, h.rating, h.rate_notes,
                        h.base_price_cents, h.service_charge_cents, h.delivery_charge_cents,
                        h.tip_cents, h.total_price_cents,
                        e.created_at, h.recorded_at,
                        u.first_name, u.last_name, u.username
                 FROM chat_history h
                 LEFT JOIN errands e ON h.errand_id = e.id
                 LEFT JOIN users u ON h.customer_id = u.id
                 WHERE ?1 IS NULL OR h.runner_id = ?1
                 ORDER BY h.recorded_at DESC, h.id DESC",
            )?;
            let rows = stmt
                .query_map([runner_id], map_history)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn insert_history(conn: &Connection, entry: &HistoryInsert<'_>) -> Result<i64, StoreError> {
    let snapshot = match entry.errand_id {
        Some(errand_id) => errand_snapshot(conn, errand_id)?,
        None => None,
    };
    let [base, service, delivery, tip, total] = match snapshot {
        Some(cents) => cents.map(Some),
        None => [None; 5],
    };

    conn.execute(
        "INSERT INTO chat_history
            (chat_id, kind, errand_id, customer_id, runner_id, status, rating, rate_notes,
             base_price_cents, service_charge_cents, delivery_charge_cents, tip_cents,
             total_price_cents, channel_created_at, channel_updated_at, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            entry.chat_id,
            entry.kind.as_str(),
            entry.errand_id,
            entry.customer_id,
            entry.runner_id,
            entry.status.as_str(),
            entry.rating,
            entry.rate_notes,
            base,
            service,
            delivery,
            tip,
            total,
            entry.channel_created_at.map(format_timestamp),
            entry.channel_updated_at.map(format_timestamp),
            format_timestamp(entry.recorded_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// `[base, service, delivery, tip, total]` cents of an errand.
fn errand_snapshot(conn: &Connection, errand_id: i64) -> Result<Option<[i64; 5]>, StoreError> {
    conn.query_row(
        "SELECT base_price_cents, service_charge_cents, delivery_charge_cents, tip_cents,
                total_price_cents
         FROM errands WHERE id = ?1",
        [errand_id],
        |row| Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?]),
    )
    .optional()
}

fn map_history(row: &Row<'_>) -> rusqlite::Result<HistoryRow> {
    let customer_id: i64 = row.get(4)?;
    let base: Option<i64> = row.get(9)?;
    let price = match base {
        Some(base) => Some(PriceBreakdown::from_cents(
            base,
            row.get(10)?,
            row.get(11)?,
            row.get(12)?,
            row.get(13)?,
        )),
        None => None,
    };
    Ok(HistoryRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        kind: get_parsed(row, 2)?,
        errand_id: row.get(3)?,
        customer_id,
        runner_id: row.get(5)?,
        status: get_parsed(row, 6)?,
        rating: get_rating(row, 7)?,
        rate_notes: row.get(8)?,
        price,
        errand_created_at: get_opt_ts(row, 14)?,
        recorded_at: get_ts(row, 15)?,
        customer_name: get_name(row, 16)?.unwrap_or_else(|| format!("user {customer_id}")),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::NewMessage;
    use crate::queries::errands::tests::add_errand;
    use crate::queries::users::tests::add_user;
    use chrono::TimeZone;
    use errand_types::models::{MessageKind, Role};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 8, 30, 0).unwrap()
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).unwrap()
    }

    /// Customer, runner, and an accepted errand with a two-message chat.
    pub(crate) fn live_chat(db: &Database) -> (i64, i64, i64, i64) {
        let ana = add_user(db, "ana", Role::Customer);
        let rey = add_user(db, "rey", Role::Runner);
        let errand = add_errand(db, ana, t0());
        let channel = db.accept_errand(errand, rey, t0()).unwrap().channel_id;
        for (sender, text) in [(ana, "hi"), (rey, "picked up")] {
            db.insert_message(&NewMessage {
                channel_id: channel,
                sender_id: sender,
                kind: MessageKind::Text,
                content: Some(text),
                attachment: None,
                created_at: t0(),
            })
            .unwrap();
        }
        (ana, rey, errand, channel)
    }

    #[test]
    fn test_archive_moves_channel_and_messages() {
        let db = Database::open_in_memory().unwrap();
        let (ana, rey, errand, channel) = live_chat(&db);

        let outcome = db.archive_channel(channel, t0()).unwrap();
        assert_eq!(outcome.messages_archived, 2);

        assert!(db.get_channel(channel).unwrap().is_none());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages_history"), 2);

        let history = db.list_history(None).unwrap();
        assert_eq!(history.len(), 1);
        let row = &history[0];
        assert_eq!(row.id, outcome.history_id);
        assert_eq!(row.chat_id, channel);
        assert_eq!(row.kind, HistoryKind::Archive);
        assert_eq!(row.status, ChannelStatus::Done);
        assert_eq!(row.errand_id, Some(errand));
        assert_eq!((row.customer_id, row.runner_id), (ana, rey));
        assert_eq!(row.customer_name, "ana");
        assert_eq!(row.price.as_ref().unwrap().to_cents().unwrap()[4], 17_500);

        // Participants stay resolvable after the live row is gone.
        let participants = db.channel_participants(channel).unwrap().unwrap();
        assert!(participants.contains(rey));
    }

    #[test]
    fn test_archive_twice_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, _, channel) = live_chat(&db);
        db.archive_channel(channel, t0()).unwrap();
        assert!(matches!(
            db.archive_channel(channel, t0()),
            Err(StoreError::NotFound("channel"))
        ));
    }

    #[test]
    fn test_archive_rolls_back_on_failure() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, _, channel) = live_chat(&db);

        // Fail the last step of the sequence.
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_channel_delete BEFORE DELETE ON channels
                 BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.archive_channel(channel, t0()).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM chat_history"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages_history"), 0);
        assert_eq!(db.list_messages(channel).unwrap().len(), 2);
        assert!(db.get_channel(channel).unwrap().is_some());
    }

    #[test]
    fn test_history_is_append_only() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, _, channel) = live_chat(&db);
        db.archive_channel(channel, t0()).unwrap();

        let result = db.with_conn(|conn| {
            conn.execute("DELETE FROM chat_history", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM chat_history"), 1);
    }

    #[test]
    fn test_history_filters_by_runner() {
        let db = Database::open_in_memory().unwrap();
        let (_, rey, _, channel) = live_chat(&db);
        db.archive_channel(channel, t0()).unwrap();

        assert_eq!(db.list_history(Some(rey)).unwrap().len(), 1);
        assert!(db.list_history(Some(rey + 100)).unwrap().is_empty());
    }
}
