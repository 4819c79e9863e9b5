use rusqlite::Connection;

use crate::error::AppError;

/// Bumped whenever the schema below changes shape.
pub const SCHEMA_VERSION: i64 = 2;

/// Initialize the database schema. Uses CREATE ... IF NOT EXISTS so it's
/// safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS collections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            scheduler TEXT NOT NULL DEFAULT 'fsrs',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS training_data (
            collection_id INTEGER PRIMARY KEY REFERENCES collections(id) ON DELETE CASCADE,
            max_new_cards INTEGER NOT NULL,
            max_review_cards INTEGER NOT NULL,
            max_learning_cards INTEGER NOT NULL,
            total_card_views INTEGER NOT NULL DEFAULT 0,
            total_success_responses INTEGER NOT NULL DEFAULT 0,
            total_failed_responses INTEGER NOT NULL DEFAULT 0,
            total_score INTEGER NOT NULL DEFAULT 0,
            streak INTEGER NOT NULL DEFAULT 0,
            last_training_date TEXT
        );

        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            front TEXT NOT NULL,
            back TEXT NOT NULL,
            front_image INTEGER,
            back_image INTEGER,
            front_audio INTEGER,
            back_audio INTEGER,
            hide INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            state INTEGER NOT NULL DEFAULT 0,
            learning_step INTEGER NOT NULL DEFAULT 0,
            ease_factor REAL NOT NULL DEFAULT 2.5,
            stability REAL,
            difficulty REAL,
            interval_days INTEGER NOT NULL DEFAULT 0,
            repeat_time TEXT,
            prev_repeat_time TEXT,
            successful_repeats INTEGER NOT NULL DEFAULT 0,
            failed_repeats INTEGER NOT NULL DEFAULT 0,
            reps INTEGER NOT NULL DEFAULT 0,
            lapses INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS cards_by_collection_state
            ON cards(collection_id, state, repeat_time);

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            training_date TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            new_cards INTEGER NOT NULL DEFAULT 0,
            review_cards INTEGER NOT NULL DEFAULT 0,
            learning_cards INTEGER NOT NULL DEFAULT 0,
            total_views INTEGER NOT NULL DEFAULT 0,
            success_responses INTEGER NOT NULL DEFAULT 0,
            failed_responses INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        DROP INDEX IF EXISTS one_started_session_per_day;
        CREATE UNIQUE INDEX IF NOT EXISTS one_live_session_per_day
            ON sessions(collection_id, training_date) WHERE status >= 0;

        CREATE TABLE IF NOT EXISTS session_cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            planned_review_time TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS session_cards_by_position
            ON session_cards(session_id, position);

        CREATE TABLE IF NOT EXISTS review_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            card_state INTEGER NOT NULL,
            grade INTEGER NOT NULL,
            review_duration_ms INTEGER NOT NULL DEFAULT 0,
            scheduled_review_time TEXT NOT NULL,
            stability REAL,
            difficulty REAL,
            ease_factor REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS review_log_by_card
            ON review_log(card_id, created_at);
        ",
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_stamps_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn only_one_live_session_per_collection_and_day() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute("INSERT INTO collections (name) VALUES ('c')", [])
            .unwrap();
        let insert = "INSERT INTO sessions (collection_id, training_date, status, created_at)
                      VALUES (1, '2024-05-01', ?1, '2024-05-01T09:00:00.000Z')";
        conn.execute(insert, [0]).unwrap();
        assert!(conn.execute(insert, [0]).is_err());
        assert!(conn.execute(insert, [1]).is_err());
        // Abandoned sessions never block.
        conn.execute(insert, [-1]).unwrap();
        conn.execute(insert, [-1]).unwrap();
    }
}
