use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::debug;
use uuid::Uuid;

use errand_types::models::format_timestamp;

use crate::models::{
    ChannelRow, ChannelSummaryRow, MessagePreviewRow, MessageRow, NewMessage, Participants,
};
use crate::queries::{OptionalExt, get_name, get_opt_ts, get_parsed, get_rating, get_ts};
use crate::{Database, StoreError};

const CHANNEL_COLUMNS: &str = "c.id, c.customer_id, c.runner_id, c.errand_id, c.status, c.rating, \
                               c.rate_notes, c.created_at, c.updated_at";

impl Database {
    /// Find or create the live channel for the unordered pair
    /// `{customer_id, runner_id}`. Argument order does not matter.
    pub fn ensure_channel(
        &self,
        customer_id: i64,
        runner_id: i64,
        errand_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.with_conn(|conn| upsert_channel(conn, customer_id, runner_id, errand_id, now))
    }

    pub fn get_channel(&self, channel_id: i64) -> Result<Option<ChannelRow>, StoreError> {
        self.with_conn(|conn| query_channel(conn, channel_id))
    }

    /// Participants of a live channel, or of its newest history record once
    /// archived. `None` when the id was never a channel.
    pub fn channel_participants(&self, channel_id: i64) -> Result<Option<Participants>, StoreError> {
        self.with_conn(|conn| {
            if let Some(channel) = query_channel(conn, channel_id)? {
                return Ok(Some(Participants {
                    customer_id: channel.customer_id,
                    runner_id: channel.runner_id,
                }));
            }
            conn.query_row(
                "SELECT customer_id, runner_id FROM chat_history
                 WHERE chat_id = ?1 ORDER BY id DESC LIMIT 1",
                [channel_id],
                |row| {
                    Ok(Participants {
                        customer_id: row.get(0)?,
                        runner_id: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Live channels the user takes part in, most recent conversation first.
    /// Channels without messages sort last, newest channel first.
    pub fn list_channels_for(&self, user_id: i64) -> Result<Vec<ChannelSummaryRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHANNEL_COLUMNS},
                        o.id, o.first_name, o.last_name, o.username,
                        m.kind, m.content, m.attachment, m.created_at
                 FROM channels c
                 JOIN users o
                   ON o.id = CASE WHEN c.customer_id = ?1 THEN c.runner_id ELSE c.customer_id END
                 LEFT JOIN messages m ON m.rowid = (
                     SELECT m2.rowid FROM messages m2
                     WHERE m2.channel_id = c.id
                     ORDER BY m2.created_at DESC, m2.rowid DESC
                     LIMIT 1
                 )
                 WHERE c.customer_id = ?1 OR c.runner_id = ?1
                 ORDER BY (m.created_at IS NULL) ASC, m.created_at DESC, c.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let other_user_id: i64 = row.get(9)?;
                    let latest_at = get_opt_ts(row, 16)?;
                    let latest_message = match latest_at {
                        Some(created_at) => Some(MessagePreviewRow {
                            kind: get_parsed(row, 13)?,
                            content: row.get(14)?,
                            attachment: row.get(15)?,
                            created_at,
                        }),
                        None => None,
                    };
                    Ok(ChannelSummaryRow {
                        channel: map_channel(row)?,
                        other_user_id,
                        other_user_name: get_name(row, 10)?
                            .unwrap_or_else(|| format!("user {other_user_id}")),
                        latest_message,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Append a message to a live channel. The id is generated here so the
    /// message keeps it when moved into history.
    pub fn insert_message(&self, message: &NewMessage<'_>) -> Result<MessageRow, StoreError> {
        self.with_tx(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM channels WHERE id = ?1", [message.channel_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound("channel"));
            }

            let id = Uuid::new_v4().to_string();
            let created_at = format_timestamp(message.created_at);
            conn.execute(
                "INSERT INTO messages (id, channel_id, sender_id, kind, content, attachment, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    message.channel_id,
                    message.sender_id,
                    message.kind.as_str(),
                    message.content,
                    message.attachment,
                    created_at,
                ],
            )?;
            conn.execute(
                "UPDATE channels SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![created_at, message.channel_id],
            )?;

            debug!(channel_id = message.channel_id, message_id = %id, "message stored");
            conn.query_row(
                "SELECT m.id, m.channel_id, m.sender_id, m.kind, m.content, m.attachment,
                        m.created_at, u.first_name, u.last_name, u.username
                 FROM messages m LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.id = ?1",
                [&id],
                map_message,
            )
            .map_err(StoreError::from)
        })
    }

    /// Transcript of a live channel, oldest first.
    pub fn list_messages(&self, channel_id: i64) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.channel_id, m.sender_id, m.kind, m.content, m.attachment,
                        m.created_at, u.first_name, u.last_name, u.username
                 FROM messages m LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.channel_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([channel_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Single-statement upsert on the normalized pair, so two concurrent callers
/// can never create two live channels for the same users. Rebinding the
/// channel to a new errand clears the previous errand's rating.
pub(crate) fn upsert_channel(
    conn: &Connection,
    customer_id: i64,
    runner_id: i64,
    errand_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    if customer_id == runner_id {
        return Err(StoreError::invalid("a channel needs two different users"));
    }
    let (low, high) = (customer_id.min(runner_id), customer_id.max(runner_id));
    let now = format_timestamp(now);

    let id: i64 = conn.query_row(
        "INSERT INTO channels
            (customer_id, runner_id, pair_low, pair_high, errand_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6)
         ON CONFLICT (pair_low, pair_high) DO UPDATE SET
            errand_id = COALESCE(excluded.errand_id, channels.errand_id),
            rating = CASE WHEN excluded.errand_id IS NOT NULL
                               AND excluded.errand_id IS NOT channels.errand_id
                          THEN NULL ELSE channels.rating END,
            rate_notes = CASE WHEN excluded.errand_id IS NOT NULL
                                   AND excluded.errand_id IS NOT channels.errand_id
                              THEN NULL ELSE channels.rate_notes END,
            updated_at = excluded.updated_at
         RETURNING id",
        rusqlite::params![customer_id, runner_id, low, high, errand_id, now],
        |row| row.get(0),
    )?;

    debug!(channel_id = id, customer_id, runner_id, "channel ensured");
    Ok(id)
}

pub(crate) fn query_channel(conn: &Connection, channel_id: i64) -> Result<Option<ChannelRow>, StoreError> {
    conn.query_row(
        &format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.id = ?1"),
        [channel_id],
        map_channel,
    )
    .optional()
}

fn map_channel(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        runner_id: row.get(2)?,
        errand_id: row.get(3)?,
        status: get_parsed(row, 4)?,
        rating: get_rating(row, 5)?,
        rate_notes: row.get(6)?,
        created_at: get_ts(row, 7)?,
        updated_at: get_ts(row, 8)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let sender_id: i64 = row.get(2)?;
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        sender_id,
        kind: get_parsed(row, 3)?,
        content: row.get(4)?,
        attachment: row.get(5)?,
        created_at: get_ts(row, 6)?,
        sender_name: get_name(row, 7)?.unwrap_or_else(|| format!("user {sender_id}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::tests::add_user;
    use chrono::{Duration, TimeZone};
    use errand_types::models::{ChannelStatus, MessageKind, Role};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn say(db: &Database, channel_id: i64, sender_id: i64, text: &str, at: DateTime<Utc>) -> MessageRow {
        db.insert_message(&NewMessage {
            channel_id,
            sender_id,
            kind: MessageKind::Text,
            content: Some(text),
            attachment: None,
            created_at: at,
        })
        .unwrap()
    }

    #[test]
    fn test_ensure_channel_is_symmetric() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);

        let a = db.ensure_channel(ana, rey, None, t0()).unwrap();
        let b = db.ensure_channel(rey, ana, None, t0()).unwrap();
        assert_eq!(a, b);

        let channel = db.get_channel(a).unwrap().unwrap();
        assert_eq!(channel.customer_id, ana);
        assert_eq!(channel.runner_id, rey);
        assert_eq!(channel.status, ChannelStatus::Active);
        assert!(channel.has_participant(rey));
    }

    #[test]
    fn test_ensure_channel_rejects_self_pair() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        assert!(matches!(
            db.ensure_channel(ana, ana, None, t0()),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_messages_in_order_with_sender_names() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);
        let channel = db.ensure_channel(ana, rey, None, t0()).unwrap();

        say(&db, channel, ana, "hello", t0());
        say(&db, channel, rey, "on my way", t0());
        say(&db, channel, ana, "thanks", t0() + Duration::minutes(1));

        let messages = db.list_messages(channel).unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.content.as_deref().unwrap()).collect();
        assert_eq!(texts, vec!["hello", "on my way", "thanks"]);
        assert_eq!(messages[1].sender_name, "rey");
        assert_ne!(messages[0].id, messages[1].id);
    }

    #[test]
    fn test_insert_message_unknown_channel() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let err = db
            .insert_message(&NewMessage {
                channel_id: 99,
                sender_id: ana,
                kind: MessageKind::Text,
                content: Some("hi"),
                attachment: None,
                created_at: t0(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("channel")));
    }

    #[test]
    fn test_list_channels_orders_by_latest_message() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);
        let sam = add_user(&db, "sam", Role::Runner);
        let tom = add_user(&db, "tom", Role::Runner);

        let with_rey = db.ensure_channel(ana, rey, None, t0()).unwrap();
        let with_sam = db.ensure_channel(ana, sam, None, t0()).unwrap();
        let with_tom = db.ensure_channel(ana, tom, None, t0()).unwrap();

        say(&db, with_sam, sam, "first", t0() + Duration::minutes(1));
        say(&db, with_rey, rey, "later", t0() + Duration::minutes(5));

        let summaries = db.list_channels_for(ana).unwrap();
        let ids: Vec<i64> = summaries.iter().map(|s| s.channel.id).collect();
        assert_eq!(ids, vec![with_rey, with_sam, with_tom]);

        assert_eq!(summaries[0].other_user_id, rey);
        assert_eq!(summaries[0].other_user_name, "rey");
        let preview = summaries[0].latest_message.as_ref().unwrap();
        assert_eq!(preview.content.as_deref(), Some("later"));
        assert!(summaries[2].latest_message.is_none());

        let for_rey = db.list_channels_for(rey).unwrap();
        assert_eq!(for_rey.len(), 1);
        assert_eq!(for_rey[0].other_user_id, ana);
    }

    #[test]
    fn test_participants_of_unknown_channel() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.channel_participants(7).unwrap().is_none());
    }
}
