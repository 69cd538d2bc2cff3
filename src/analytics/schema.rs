//! SQLite DDL for the review analytics store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Schema version stamped into fresh databases.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the analytics database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints.
PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Workspace identity: one row per workspace root this database serves.
CREATE TABLE IF NOT EXISTS workspaces (
    id         INTEGER PRIMARY KEY,
    root_path  TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

-- Review history: one row per scheduling event.
-- Rows are immutable at creation except undone_at, set exactly once by a
-- successful compensation.
CREATE TABLE IF NOT EXISTS review_history (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id       INTEGER NOT NULL REFERENCES workspaces(id),
    reviewed_at        INTEGER NOT NULL,   -- unix seconds
    deck_path          TEXT NOT NULL,
    deck_relative_path TEXT NOT NULL,
    card_id            TEXT NOT NULL,
    grade              INTEGER NOT NULL CHECK (grade BETWEEN 0 AND 3),
    prev_stability     REAL,
    prev_difficulty    REAL,
    prev_state         TEXT NOT NULL,
    prev_due           INTEGER,            -- unix seconds
    next_stability     REAL,
    next_difficulty    REAL,
    next_state         TEXT NOT NULL,
    next_due           INTEGER,            -- unix seconds
    undone_at          INTEGER             -- unix seconds, null until undone
);

-- Indexes for the query patterns the UI and stats layer use.
CREATE INDEX IF NOT EXISTS idx_history_recent
    ON review_history(workspace_id, reviewed_at DESC);
CREATE INDEX IF NOT EXISTS idx_history_grade
    ON review_history(workspace_id, grade, reviewed_at DESC);
CREATE INDEX IF NOT EXISTS idx_history_card
    ON review_history(workspace_id, card_id, reviewed_at DESC);
CREATE INDEX IF NOT EXISTS idx_history_deck
    ON review_history(workspace_id, deck_relative_path, reviewed_at DESC);

-- Partial index over rows that still count toward statistics.
CREATE INDEX IF NOT EXISTS idx_history_not_undone
    ON review_history(workspace_id, reviewed_at DESC)
    WHERE undone_at IS NULL;
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version if this is a fresh
/// database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"workspaces".to_owned()));
        assert!(tables.contains(&"review_history".to_owned()));
        assert!(tables.contains(&"schema_meta".to_owned()));
    }

    #[test]
    fn test_apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
    }

    #[test]
    fn test_schema_version_is_seeded() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let version = read_schema_version(&conn).unwrap().unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_partial_index_exists() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let sql: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type='index' AND name='idx_history_not_undone'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(sql.contains("WHERE undone_at IS NULL"));
    }
}
