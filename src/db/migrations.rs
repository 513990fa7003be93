use anyhow::Result;
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS members (
            user_id               TEXT PRIMARY KEY,
            belt                  TEXT NOT NULL DEFAULT 'white',
            previous_belt         TEXT,
            cumulative_check_ins  INTEGER NOT NULL DEFAULT 0,
            version               INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS dan_completions (
            user_id       TEXT NOT NULL REFERENCES members(user_id) ON DELETE CASCADE,
            dan_number    INTEGER NOT NULL CHECK(dan_number BETWEEN 1 AND 4),
            group_size    INTEGER NOT NULL CHECK(group_size IN (40, 60)),
            count         INTEGER NOT NULL,
            completed_on  TEXT NOT NULL,
            PRIMARY KEY(user_id, dan_number)
        );

        CREATE TABLE IF NOT EXISTS check_ins (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id        TEXT NOT NULL REFERENCES members(user_id) ON DELETE CASCADE,
            checked_in_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_check_ins_user ON check_ins(user_id, checked_in_at);
    ")?;
    Ok(())
}
