use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use errand_types::models::{Role, format_timestamp};
use errand_types::pricing::PriceBreakdown;

use crate::models::{AcceptOutcome, ErrandListRow, ErrandRow, NewErrand};
use crate::queries::channels::upsert_channel;
use crate::queries::users::role_of;
use crate::queries::{OptionalExt, get_name, get_opt_ts, get_rating, get_ts};
use crate::{Database, StoreError};

// Requester and runner names are joined as (first_name, last_name, username).
const ERRAND_SELECT: &str = "
    SELECT e.id, e.requester_id, e.runner_id, e.task_description, e.collecting_location,
           e.delivery_location, e.base_price_cents, e.service_charge_cents,
           e.delivery_charge_cents, e.tip_cents, e.total_price_cents, e.is_accepted,
           e.created_at, e.accepted_at,
           u.first_name, u.last_name, u.username,
           r.first_name, r.last_name, r.username";

const ERRAND_JOINS: &str = "
    FROM errands e
    LEFT JOIN users u ON e.requester_id = u.id
    LEFT JOIN users r ON e.runner_id = r.id";

impl Database {
    pub fn create_errand(&self, errand: &NewErrand<'_>) -> Result<i64, StoreError> {
        let [base, service, delivery, tip, total] = errand
            .price
            .to_cents()
            .map_err(|e| StoreError::invalid(e.to_string()))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO errands
                    (requester_id, task_description, collecting_location, delivery_location,
                     base_price_cents, service_charge_cents, delivery_charge_cents, tip_cents,
                     total_price_cents, is_accepted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
                rusqlite::params![
                    errand.requester_id,
                    errand.task_description,
                    errand.collecting_location,
                    errand.delivery_location,
                    base,
                    service,
                    delivery,
                    tip,
                    total,
                    format_timestamp(errand.created_at),
                ],
            )?;
            let id = conn.last_insert_rowid();
            debug!(errand_id = id, requester_id = errand.requester_id, "errand created");
            Ok(id)
        })
    }

    pub fn get_errand(&self, errand_id: i64) -> Result<Option<ErrandRow>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{ERRAND_SELECT} {ERRAND_JOINS} WHERE e.id = ?1"),
                [errand_id],
                map_errand,
            )
            .optional()
        })
    }

    /// Every errand, newest first, with the newest rating recorded for it.
    pub fn list_errands(&self) -> Result<Vec<ErrandListRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "{ERRAND_SELECT},
                    (SELECT ch.rating FROM chat_history ch
                     WHERE ch.errand_id = e.id AND ch.rating IS NOT NULL
                     ORDER BY ch.id DESC LIMIT 1),
                    (SELECT ch.rate_notes FROM chat_history ch
                     WHERE ch.errand_id = e.id AND ch.rating IS NOT NULL
                     ORDER BY ch.id DESC LIMIT 1)
                 {ERRAND_JOINS}
                 ORDER BY e.created_at DESC, e.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ErrandListRow {
                        errand: map_errand(row)?,
                        rating: get_rating(row, 20)?,
                        rate_notes: row.get(21)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Assign `runner_id` to the errand and provision the conversation, in
    /// one transaction. The runner is only ever set once: a second accept
    /// is a `Conflict`, whoever makes it.
    pub fn accept_errand(
        &self,
        errand_id: i64,
        runner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AcceptOutcome, StoreError> {
        self.with_tx(|conn| {
            if role_of(conn, runner_id)? != Role::Runner {
                return Err(StoreError::Forbidden("only runners can accept errands".into()));
            }

            let (requester_id, current_runner): (i64, Option<i64>) = conn
                .query_row(
                    "SELECT requester_id, runner_id FROM errands WHERE id = ?1",
                    [errand_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or(StoreError::NotFound("errand"))?;

            if current_runner.is_some() {
                return Err(StoreError::conflict("errand already accepted"));
            }
            if requester_id == runner_id {
                return Err(StoreError::invalid("cannot accept your own errand"));
            }

            let changed = compare_and_set_runner(conn, errand_id, runner_id, now)?;
            if changed == 0 {
                return Err(StoreError::conflict("errand already accepted"));
            }

            let channel_id = upsert_channel(conn, requester_id, runner_id, Some(errand_id), now)?;

            info!(errand_id, runner_id, channel_id, "errand accepted");
            Ok(AcceptOutcome {
                errand_id,
                channel_id,
                requester_id,
            })
        })
    }
}

fn compare_and_set_runner(
    conn: &Connection,
    errand_id: i64,
    runner_id: i64,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE errands SET is_accepted = 1, runner_id = ?1, accepted_at = ?2
         WHERE id = ?3 AND runner_id IS NULL",
        rusqlite::params![runner_id, format_timestamp(now), errand_id],
    )?;
    Ok(changed)
}

fn map_errand(row: &Row<'_>) -> rusqlite::Result<ErrandRow> {
    let requester_id: i64 = row.get(1)?;
    Ok(ErrandRow {
        id: row.get(0)?,
        requester_id,
        runner_id: row.get(2)?,
        task_description: row.get(3)?,
        collecting_location: row.get(4)?,
        delivery_location: row.get(5)?,
        price: PriceBreakdown::from_cents(
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            row.get(10)?,
        ),
        is_accepted: row.get(11)?,
        created_at: get_ts(row, 12)?,
        accepted_at: get_opt_ts(row, 13)?,
        requester_name: get_name(row, 14)?.unwrap_or_else(|| format!("user {requester_id}")),
        runner_name: get_name(row, 17)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::queries::users::tests::add_user;
    use chrono::{Duration, TimeZone};
    use errand_types::pricing::{Pricing, cents_to_decimal};

    pub(crate) fn add_errand(db: &Database, requester_id: i64, at: DateTime<Utc>) -> i64 {
        let price = Pricing::default().quote(cents_to_decimal(2_000)).unwrap();
        db.create_errand(&NewErrand {
            requester_id,
            task_description: "buy medicine",
            collecting_location: "pharmacy",
            delivery_location: "home",
            price,
            created_at: at,
        })
        .unwrap()
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_create_and_get_errand() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let id = add_errand(&db, ana, at(3));

        let errand = db.get_errand(id).unwrap().unwrap();
        assert_eq!(errand.requester_id, ana);
        assert_eq!(errand.requester_name, "ana");
        assert!(!errand.is_accepted);
        assert!(errand.runner_id.is_none());
        assert_eq!(errand.price.to_cents().unwrap(), [10_000, 500, 5_000, 2_000, 17_500]);
        assert_eq!(errand.created_at, at(3));

        assert!(db.get_errand(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_list_errands_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let old = add_errand(&db, ana, at(3));
        let new = add_errand(&db, ana, at(3) + Duration::hours(2));

        let ids: Vec<i64> = db.list_errands().unwrap().iter().map(|r| r.errand.id).collect();
        assert_eq!(ids, vec![new, old]);
    }

    #[test]
    fn test_accept_assigns_runner_and_opens_channel() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);
        let errand = add_errand(&db, ana, at(3));

        let outcome = db.accept_errand(errand, rey, at(4)).unwrap();
        assert_eq!(outcome.errand_id, errand);
        assert_eq!(outcome.requester_id, ana);

        let row = db.get_errand(errand).unwrap().unwrap();
        assert!(row.is_accepted);
        assert_eq!(row.runner_id, Some(rey));
        assert_eq!(row.runner_name.as_deref(), Some("rey"));
        assert_eq!(row.accepted_at, Some(at(4)));

        let channel = db.get_channel(outcome.channel_id).unwrap().unwrap();
        assert_eq!(channel.customer_id, ana);
        assert_eq!(channel.runner_id, rey);
        assert_eq!(channel.errand_id, Some(errand));
    }

    #[test]
    fn test_second_accept_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);
        let sam = add_user(&db, "sam", Role::Runner);
        let errand = add_errand(&db, ana, at(3));

        db.accept_errand(errand, rey, at(4)).unwrap();
        assert!(matches!(db.accept_errand(errand, sam, at(4)), Err(StoreError::Conflict(_))));
        assert!(matches!(db.accept_errand(errand, rey, at(4)), Err(StoreError::Conflict(_))));

        let row = db.get_errand(errand).unwrap().unwrap();
        assert_eq!(row.runner_id, Some(rey));
    }

    #[test]
    fn test_accept_rejections() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let bob = add_user(&db, "bob", Role::Customer);
        let errand = add_errand(&db, ana, at(3));

        assert!(matches!(db.accept_errand(errand, bob, at(4)), Err(StoreError::Forbidden(_))));

        let rey = add_user(&db, "rey", Role::Runner);
        assert!(matches!(
            db.accept_errand(errand + 10, rey, at(4)),
            Err(StoreError::NotFound("errand"))
        ));

        // A runner's own errand (posted before promotion)
        let own = add_errand(&db, rey, at(3));
        assert!(matches!(db.accept_errand(own, rey, at(4)), Err(StoreError::Invalid(_))));
        assert!(!db.get_errand(own).unwrap().unwrap().is_accepted);
    }

    #[test]
    fn test_accepting_twice_for_same_pair_reuses_channel() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let rey = add_user(&db, "rey", Role::Runner);
        let first = add_errand(&db, ana, at(3));
        let second = add_errand(&db, ana, at(3));

        let a = db.accept_errand(first, rey, at(4)).unwrap();
        let b = db.accept_errand(second, rey, at(5)).unwrap();
        assert_eq!(a.channel_id, b.channel_id);

        let channel = db.get_channel(b.channel_id).unwrap().unwrap();
        assert_eq!(channel.errand_id, Some(second));
    }
}
