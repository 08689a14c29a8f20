use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::info;

use errand_types::models::{ApplicationStatus, Role, format_timestamp};

use crate::error::is_constraint_violation;
use crate::models::{ApplicationRow, NewApplication};
use crate::queries::users::role_of;
use crate::queries::{OptionalExt, get_name, get_opt_ts, get_parsed, get_ts};
use crate::{Database, StoreError};

const APPLICATION_SELECT: &str = "
    SELECT a.id, a.user_id, a.valid_id_1, a.valid_id_2, a.police_clearance,
           a.barangay_clearance, a.mode_of_transport, a.emergency_contact_person,
           a.emergency_contact_number, a.status, a.created_at, a.reviewed_at,
           u.first_name, u.last_name, u.username
    FROM runner_applications a
    LEFT JOIN users u ON a.user_id = u.id";

impl Database {
    /// File a runner application. Only customers apply, and only one
    /// application per user may be pending.
    pub fn create_application(
        &self,
        user_id: i64,
        application: &NewApplication<'_>,
        now: DateTime<Utc>,
    ) -> Result<ApplicationRow, StoreError> {
        self.with_tx(|conn| {
            if role_of(conn, user_id)? != Role::Customer {
                return Err(StoreError::conflict("only customers can apply to become runners"));
            }

            let result = conn.execute(
                "INSERT INTO runner_applications
                    (user_id, valid_id_1, valid_id_2, police_clearance, barangay_clearance,
                     mode_of_transport, emergency_contact_person, emergency_contact_number,
                     status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)",
                rusqlite::params![
                    user_id,
                    application.valid_id_1,
                    application.valid_id_2,
                    application.police_clearance,
                    application.barangay_clearance,
                    application.mode_of_transport,
                    application.emergency_contact_person,
                    application.emergency_contact_number,
                    format_timestamp(now),
                ],
            );
            match result {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    return Err(StoreError::conflict("an application is already pending"));
                }
                Err(e) => return Err(e.into()),
            }

            let id = conn.last_insert_rowid();
            info!(application_id = id, user_id, "runner application filed");
            query_application(conn, id)?.ok_or(StoreError::NotFound("application"))
        })
    }

    pub fn list_applications(&self) -> Result<Vec<ApplicationRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{APPLICATION_SELECT} ORDER BY a.created_at DESC, a.id DESC"))?;
            let rows = stmt
                .query_map([], map_application)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Approve a pending application and promote the applicant to runner,
    /// atomically.
    pub fn approve_application(
        &self,
        application_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ApplicationRow, StoreError> {
        self.with_tx(|conn| {
            let application = review(conn, application_id, ApplicationStatus::Approved, now)?;
            conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                rusqlite::params![Role::Runner.as_str(), application.user_id],
            )?;
            info!(application_id, user_id = application.user_id, "applicant promoted to runner");
            query_application(conn, application_id)?.ok_or(StoreError::NotFound("application"))
        })
    }

    pub fn reject_application(
        &self,
        application_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ApplicationRow, StoreError> {
        self.with_tx(|conn| {
            let application = review(conn, application_id, ApplicationStatus::Rejected, now)?;
            info!(application_id, user_id = application.user_id, "runner application rejected");
            Ok(application)
        })
    }
}

/// Move a pending application to its terminal status.
fn review(
    conn: &Connection,
    application_id: i64,
    status: ApplicationStatus,
    now: DateTime<Utc>,
) -> Result<ApplicationRow, StoreError> {
    let changed = conn.execute(
        "UPDATE runner_applications SET status = ?1, reviewed_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        rusqlite::params![status.as_str(), format_timestamp(now), application_id],
    )?;
    let application =
        query_application(conn, application_id)?.ok_or(StoreError::NotFound("application"))?;
    if changed == 0 {
        return Err(StoreError::conflict(format!(
            "application is already {}",
            application.status.as_str()
        )));
    }
    Ok(application)
}

fn query_application(conn: &Connection, id: i64) -> Result<Option<ApplicationRow>, StoreError> {
    conn.query_row(&format!("{APPLICATION_SELECT} WHERE a.id = ?1"), [id], map_application)
        .optional()
}

fn map_application(row: &Row<'_>) -> rusqlite::Result<ApplicationRow> {
    let user_id: i64 = row.get(1)?;
    Ok(ApplicationRow {
        id: row.get(0)?,
        user_id,
        valid_id_1: row.get(2)?,
        valid_id_2: row.get(3)?,
        police_clearance: row.get(4)?,
        barangay_clearance: row.get(5)?,
        mode_of_transport: row.get(6)?,
        emergency_contact_person: row.get(7)?,
        emergency_contact_number: row.get(8)?,
        status: get_parsed(row, 9)?,
        created_at: get_ts(row, 10)?,
        reviewed_at: get_opt_ts(row, 11)?,
        applicant_name: get_name(row, 12)?.unwrap_or_else(|| format!("user {user_id}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::tests::add_user;

    fn documents() -> NewApplication<'static> {
        NewApplication {
            valid_id_1: "id-front.jpg",
            valid_id_2: "id-back.jpg",
            police_clearance: "police.pdf",
            barangay_clearance: "barangay.pdf",
            mode_of_transport: "motorcycle",
            emergency_contact_person: "Lola",
            emergency_contact_number: "0917",
        }
    }

    #[test]
    fn test_approve_promotes_to_runner() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);

        let application = db.create_application(ana, &documents(), Utc::now()).unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.applicant_name, "ana");

        let approved = db.approve_application(application.id, Utc::now()).unwrap();
        assert_eq!(approved.status, ApplicationStatus::Approved);
        assert!(approved.reviewed_at.is_some());
        assert_eq!(db.role_of(ana).unwrap(), Role::Runner);

        assert!(matches!(
            db.approve_application(application.id, Utc::now()),
            Err(StoreError::Conflict(_))
        ));
        // Runners cannot apply again.
        assert!(matches!(
            db.create_application(ana, &documents(), Utc::now()),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_single_pending_application() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        db.create_application(ana, &documents(), Utc::now()).unwrap();
        assert!(matches!(
            db.create_application(ana, &documents(), Utc::now()),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_reject_keeps_role_and_allows_reapply() {
        let db = Database::open_in_memory().unwrap();
        let ana = add_user(&db, "ana", Role::Customer);
        let first = db.create_application(ana, &documents(), Utc::now()).unwrap();

        let rejected = db.reject_application(first.id, Utc::now()).unwrap();
        assert_eq!(rejected.status, ApplicationStatus::Rejected);
        assert_eq!(db.role_of(ana).unwrap(), Role::Customer);

        db.create_application(ana, &documents(), Utc::now()).unwrap();
        assert_eq!(db.list_applications().unwrap().len(), 2);
    }

    #[test]
    fn test_review_unknown_application() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.reject_application(42, Utc::now()),
            Err(StoreError::NotFound("application"))
        ));
    }
}
