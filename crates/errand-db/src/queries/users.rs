use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::info;

use errand_types::models::{Role, format_timestamp};

use crate::error::is_constraint_violation;
use crate::models::{NewUser, ProfileUpdate, UserRow};
use crate::queries::{OptionalExt, get_parsed, get_ts};
use crate::{Database, StoreError};

const USER_COLUMNS: &str = "id, username, password, role, first_name, last_name, email, \
                            contact_number, location, profile_picture, created_at";

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64, StoreError> {
        self.with_conn(|conn| insert_user(conn, user))
    }

    /// Create the bootstrap admin unless the username is already taken.
    /// Returns whether a row was inserted.
    pub fn ensure_admin(
        &self,
        username: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.with_tx(|conn| {
            if query_user_by_username(conn, username)?.is_some() {
                return Ok(false);
            }
            insert_user(
                conn,
                &NewUser {
                    username,
                    password_hash,
                    role: Role::Admin,
                    first_name: "",
                    last_name: "",
                    email: "",
                    created_at: now,
                },
            )?;
            info!("Bootstrap admin '{}' created", username);
            Ok(true)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Identity lookup used by every authorization check.
    pub fn role_of(&self, user_id: i64) -> Result<Role, StoreError> {
        self.with_conn(|conn| role_of(conn, user_id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Profile fields only; the role is never touched here.
    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate<'_>) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET first_name = ?1, last_name = ?2, email = ?3, contact_number = ?4,
                     location = ?5, profile_picture = COALESCE(?6, profile_picture)
                 WHERE id = ?7",
                rusqlite::params![
                    update.first_name,
                    update.last_name,
                    update.email,
                    update.contact_number,
                    update.location,
                    update.profile_picture,
                    user_id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    pub fn set_password(&self, user_id: i64, password_hash: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Remove an account and its runner applications. Users with errand
    /// activity are kept, since their history rows cannot be deleted.
    pub fn delete_user(&self, user_id: i64) -> Result<(), StoreError> {
        self.with_tx(|conn| {
            role_of(conn, user_id)?;
            conn.execute("DELETE FROM runner_applications WHERE user_id = ?1", [user_id])?;
            match conn.execute("DELETE FROM users WHERE id = ?1", [user_id]) {
                Ok(_) => {
                    info!(user_id, "User deleted");
                    Ok(())
                }
                Err(e) if is_constraint_violation(&e) => {
                    Err(StoreError::conflict("user has errand activity and cannot be deleted"))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Mean of the ratings recorded for a runner, `None` before the first.
    pub fn average_rating(&self, runner_id: i64) -> Result<Option<f64>, StoreError> {
        self.with_conn(|conn| {
            let avg: Option<f64> = conn.query_row(
                "SELECT AVG(rating) FROM chat_history
                 WHERE runner_id = ?1 AND kind = 'rating' AND rating IS NOT NULL",
                [runner_id],
                |row| row.get(0),
            )?;
            Ok(avg)
        })
    }
}

fn insert_user(conn: &Connection, user: &NewUser<'_>) -> Result<i64, StoreError> {
    let result = conn.execute(
        "INSERT INTO users (username, password, role, first_name, last_name, email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            user.username,
            user.password_hash,
            user.role.as_str(),
            user.first_name,
            user.last_name,
            user.email,
            format_timestamp(user.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_constraint_violation(&e) => {
            Err(StoreError::conflict("username already taken"))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn role_of(conn: &Connection, user_id: i64) -> Result<Role, StoreError> {
    conn.query_row("SELECT role FROM users WHERE id = ?1", [user_id], |row| {
        get_parsed::<Role>(row, 0)
    })
    .optional()?
    .ok_or(StoreError::NotFound("user"))
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>, StoreError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        [username],
        map_user,
    )
    .optional()
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>, StoreError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        map_user,
    )
    .optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: get_parsed(row, 3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        email: row.get(6)?,
        contact_number: row.get(7)?,
        location: row.get(8)?,
        profile_picture: row.get(9)?,
        created_at: get_ts(row, 10)?,
    })
}
