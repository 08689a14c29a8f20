use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                role            TEXT NOT NULL DEFAULT 'customer'
                                CHECK (role IN ('customer', 'runner', 'admin')),
                first_name      TEXT NOT NULL DEFAULT '',
                last_name       TEXT NOT NULL DEFAULT '',
                email           TEXT NOT NULL DEFAULT '',
                contact_number  TEXT NOT NULL DEFAULT '',
                location        TEXT NOT NULL DEFAULT '',
                profile_picture TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE runner_applications (
                id                       INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id                  INTEGER NOT NULL REFERENCES users(id),
                valid_id_1               TEXT NOT NULL,
                valid_id_2               TEXT NOT NULL,
                police_clearance         TEXT NOT NULL,
                barangay_clearance       TEXT NOT NULL,
                mode_of_transport        TEXT NOT NULL,
                emergency_contact_person TEXT NOT NULL,
                emergency_contact_number TEXT NOT NULL,
                status                   TEXT NOT NULL DEFAULT 'pending'
                                         CHECK (status IN ('pending', 'approved', 'rejected')),
                created_at               TEXT NOT NULL,
                reviewed_at              TEXT
            );

            -- At most one open application per user
            CREATE UNIQUE INDEX idx_applications_one_pending
                ON runner_applications(user_id) WHERE status = 'pending';

            CREATE TABLE errands (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id          INTEGER NOT NULL REFERENCES users(id),
                runner_id             INTEGER REFERENCES users(id),
                task_description      TEXT NOT NULL,
                collecting_location   TEXT NOT NULL,
                delivery_location     TEXT NOT NULL,
                base_price_cents      INTEGER NOT NULL,
                service_charge_cents  INTEGER NOT NULL,
                delivery_charge_cents INTEGER NOT NULL,
                tip_cents             INTEGER NOT NULL DEFAULT 0,
                total_price_cents     INTEGER NOT NULL,
                is_accepted           INTEGER NOT NULL DEFAULT 0,
                created_at            TEXT NOT NULL,
                accepted_at           TEXT,
                CHECK (total_price_cents = base_price_cents + service_charge_cents
                                           + delivery_charge_cents + tip_cents),
                CHECK ((runner_id IS NULL) = (is_accepted = 0))
            );

            CREATE INDEX idx_errands_created ON errands(created_at);
            CREATE INDEX idx_errands_runner ON errands(runner_id, created_at);

            -- Live conversations. (pair_low, pair_high) is the unordered
            -- participant pair, so one row per pair whatever the orientation.
            CREATE TABLE channels (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER NOT NULL REFERENCES users(id),
                runner_id   INTEGER NOT NULL REFERENCES users(id),
                pair_low    INTEGER NOT NULL,
                pair_high   INTEGER NOT NULL,
                errand_id   INTEGER REFERENCES errands(id),
                status      TEXT NOT NULL DEFAULT 'active'
                            CHECK (status IN ('active', 'done')),
                rating      INTEGER CHECK (rating BETWEEN 1 AND 5),
                rate_notes  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                UNIQUE (pair_low, pair_high),
                CHECK (pair_low < pair_high)
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                channel_id  INTEGER NOT NULL REFERENCES channels(id),
                sender_id   INTEGER NOT NULL REFERENCES users(id),
                kind        TEXT NOT NULL CHECK (kind IN ('text', 'image')),
                content     TEXT,
                attachment  TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_channel ON messages(channel_id, created_at);

            CREATE TABLE chat_history (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id               INTEGER NOT NULL,
                kind                  TEXT NOT NULL CHECK (kind IN ('archive', 'rating')),
                errand_id             INTEGER REFERENCES errands(id),
                customer_id           INTEGER NOT NULL REFERENCES users(id),
                runner_id             INTEGER NOT NULL REFERENCES users(id),
                status                TEXT NOT NULL,
                rating                INTEGER CHECK (rating BETWEEN 1 AND 5),
                rate_notes            TEXT,
                base_price_cents      INTEGER,
                service_charge_cents  INTEGER,
                delivery_charge_cents INTEGER,
                tip_cents             INTEGER,
                total_price_cents     INTEGER,
                channel_created_at    TEXT,
                channel_updated_at    TEXT,
                recorded_at           TEXT NOT NULL
            );

            CREATE INDEX idx_chat_history_chat ON chat_history(chat_id);
            CREATE INDEX idx_chat_history_errand ON chat_history(errand_id);
            CREATE INDEX idx_chat_history_runner ON chat_history(runner_id);

            CREATE TABLE messages_history (
                id          TEXT PRIMARY KEY,
                channel_id  INTEGER NOT NULL,
                sender_id   INTEGER NOT NULL REFERENCES users(id),
                kind        TEXT NOT NULL,
                content     TEXT,
                attachment  TEXT,
                created_at  TEXT NOT NULL,
                archived_at TEXT NOT NULL
            );

            CREATE INDEX idx_messages_history_channel ON messages_history(channel_id, created_at);

            -- History is append-only
            CREATE TRIGGER chat_history_no_update BEFORE UPDATE ON chat_history
            BEGIN SELECT RAISE(ABORT, 'chat_history is append-only'); END;
            CREATE TRIGGER chat_history_no_delete BEFORE DELETE ON chat_history
            BEGIN SELECT RAISE(ABORT, 'chat_history is append-only'); END;
            CREATE TRIGGER messages_history_no_update BEFORE UPDATE ON messages_history
            BEGIN SELECT RAISE(ABORT, 'messages_history is append-only'); END;
            CREATE TRIGGER messages_history_no_delete BEFORE DELETE ON messages_history
            BEGIN SELECT RAISE(ABORT, 'messages_history is append-only'); END;

            -- Stored half of a remittance week; no row means 'Not Yet'
            CREATE TABLE remittances (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                runner_id    INTEGER NOT NULL REFERENCES users(id),
                week         TEXT NOT NULL,
                status       TEXT NOT NULL CHECK (status IN ('Pending', 'Remitted')),
                proof_ref    TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                reviewed_at  TEXT,
                UNIQUE (runner_id, week)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
