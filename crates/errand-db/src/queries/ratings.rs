use chrono::{DateTime, Utc};
use tracing::info;

use errand_types::models::{ChannelStatus, HistoryKind, format_timestamp};

use crate::models::RatingOutcome;
use crate::queries::archive::{HistoryInsert, insert_history};
use crate::queries::channels::query_channel;
use crate::queries::OptionalExt;
use crate::{Database, StoreError};

impl Database {
    /// Rate the errand behind a channel. Works on a live channel and on one
    /// that has already been archived; either way a `rating` history row is
    /// appended.
    pub fn rate_channel(
        &self,
        channel_id: i64,
        rating: u8,
        rate_notes: &str,
        now: DateTime<Utc>,
    ) -> Result<RatingOutcome, StoreError> {
        if !(1..=5).contains(&rating) {
            return Err(StoreError::invalid("rating must be between 1 and 5"));
        }

        self.with_tx(|conn| {
            let entry = match query_channel(conn, channel_id)? {
                Some(channel) => {
                    conn.execute(
                        "UPDATE channels SET rating = ?1, rate_notes = ?2, updated_at = ?3
                         WHERE id = ?4",
                        rusqlite::params![rating, rate_notes, format_timestamp(now), channel_id],
                    )?;
                    HistoryInsert {
                        chat_id: channel_id,
                        kind: HistoryKind::Rating,
                        errand_id: channel.errand_id,
                        customer_id: channel.customer_id,
                        runner_id: channel.runner_id,
                        status: channel.status,
                        rating: Some(rating),
                        rate_notes: Some(rate_notes),
                        channel_created_at: Some(channel.created_at),
                        channel_updated_at: Some(now),
                        recorded_at: now,
                    }
                }
                None => {
                    let (errand_id, customer_id, runner_id): (Option<i64>, i64, i64) = conn
                        .query_row(
                            "SELECT errand_id, customer_id, runner_id FROM chat_history
                             WHERE chat_id = ?1 AND kind = 'archive'
                             ORDER BY id DESC LIMIT 1",
                            [channel_id],
                            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                        )
                        .optional()?
                        .ok_or(StoreError::NotFound("channel"))?;
                    HistoryInsert {
                        chat_id: channel_id,
                        kind: HistoryKind::Rating,
                        errand_id,
                        customer_id,
                        runner_id,
                        status: ChannelStatus::Done,
                        rating: Some(rating),
                        rate_notes: Some(rate_notes),
                        channel_created_at: None,
                        channel_updated_at: None,
                        recorded_at: now,
                    }
                }
            };

            let errand_id = entry.errand_id.ok_or(StoreError::NotFound("errand"))?;
            let history_id = insert_history(conn, &entry)?;

            info!(channel_id, errand_id, rating, "channel rated");
            Ok(RatingOutcome {
                history_id,
                errand_id,
                runner_id: entry.runner_id,
                customer_id: entry.customer_id,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::archive::tests::live_chat;
    use crate::queries::errands::tests::add_errand;
    use crate::queries::users::tests::add_user;
    use chrono::TimeZone;
    use errand_types::models::Role;

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 7, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_rate_live_channel() {
        let db = Database::open_in_memory().unwrap();
        let (ana, rey, errand, channel) = live_chat(&db);

        let outcome = db.rate_channel(channel, 4, "quick", t1()).unwrap();
        assert_eq!(outcome.errand_id, errand);
        assert_eq!((outcome.customer_id, outcome.runner_id), (ana, rey));

        let live = db.get_channel(channel).unwrap().unwrap();
        assert_eq!(live.rating, Some(4));
        assert_eq!(live.rate_notes.as_deref(), Some("quick"));

        // Archiving afterwards carries the rating along.
        db.archive_channel(channel, t1()).unwrap();
        let history = db.list_history(None).unwrap();
        let archived = history.iter().find(|h| h.kind == HistoryKind::Archive).unwrap();
        assert_eq!(archived.rating, Some(4));
        assert_eq!(archived.rate_notes.as_deref(), Some("quick"));
    }

    #[test]
    fn test_rate_after_archive() {
        let db = Database::open_in_memory().unwrap();
        let (_, rey, errand, channel) = live_chat(&db);
        db.archive_channel(channel, t1()).unwrap();

        let outcome = db.rate_channel(channel, 5, "great", t1()).unwrap();
        assert_eq!(outcome.errand_id, errand);

        let history = db.list_history(None).unwrap();
        let rated = history.iter().find(|h| h.id == outcome.history_id).unwrap();
        assert_eq!(rated.kind, HistoryKind::Rating);
        assert_eq!(rated.rating, Some(5));
        assert_eq!(rated.errand_id, Some(errand));
        assert!(rated.price.is_some());

        assert_eq!(db.average_rating(rey).unwrap(), Some(5.0));
        let listed = db.list_errands().unwrap();
        assert_eq!(listed[0].rating, Some(5));
        assert_eq!(listed[0].rate_notes.as_deref(), Some("great"));
    }

    #[test]
    fn test_rating_does_not_follow_channel_to_next_errand() {
        let db = Database::open_in_memory().unwrap();
        let (ana, rey, first, channel) = live_chat(&db);
        db.rate_channel(channel, 1, "late", t1()).unwrap();

        let second = add_errand(&db, ana, t1());
        let rebound = db.accept_errand(second, rey, t1()).unwrap();
        assert_eq!(rebound.channel_id, channel);

        let live = db.get_channel(channel).unwrap().unwrap();
        assert_eq!(live.errand_id, Some(second));
        assert_eq!(live.rating, None);
        assert_eq!(live.rate_notes, None);

        db.archive_channel(channel, t1()).unwrap();
        let archived = db
            .list_history(None)
            .unwrap()
            .into_iter()
            .find(|h| h.kind == HistoryKind::Archive)
            .unwrap();
        assert_eq!(archived.errand_id, Some(second));
        assert_eq!(archived.rating, None);

        let listed = db.list_errands().unwrap();
        let rated = listed.iter().find(|e| e.errand.id == first).unwrap();
        let unrated = listed.iter().find(|e| e.errand.id == second).unwrap();
        assert_eq!(rated.rating, Some(1));
        assert_eq!(unrated.rating, None);
        assert_eq!(unrated.rate_notes, None);
    }

    #[test]
    fn test_rating_range() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, _, channel) = live_chat(&db);
        for bad in [0, 6] {
            assert!(matches!(
                db.rate_channel(channel, bad, "", t1()),
                Err(StoreError::Invalid(_))
            ));
        }
    }

    #[test]
    fn test_rate_requires_linked_errand() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);
        let channel = db.ensure_channel(ana, rey, None, t1()).unwrap();

        assert!(matches!(
            db.rate_channel(channel, 3, "", t1()),
            Err(StoreError::NotFound("errand"))
        ));
        assert!(matches!(
            db.rate_channel(channel + 50, 3, "", t1()),
            Err(StoreError::NotFound("channel"))
        ));
        // Nothing was written for the rejected attempt.
        assert!(db.get_channel(channel).unwrap().unwrap().rating.is_none());
    }
}
