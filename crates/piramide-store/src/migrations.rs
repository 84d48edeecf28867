use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS preferences (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- touched is a monotonic counter so eviction order is deterministic
        CREATE TABLE IF NOT EXISTS vote_ledger (
            post_id     TEXT PRIMARY KEY,
            vote        TEXT NOT NULL DEFAULT 'none',
            reported    INTEGER NOT NULL DEFAULT 0,
            touched     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_vote_ledger_touched
            ON vote_ledger(touched);
        ",
    )?;

    debug!("Store migrations complete");
    Ok(())
}
