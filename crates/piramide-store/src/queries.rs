use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use piramide_types::models::{PostId, VoteState};

use crate::LocalStore;
use crate::models::LedgerEntry;

impl LocalStore {
    // -- Key-value --

    /// Reads a JSON value. Undecodable values are treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = self.with_conn(|conn| query_preference(conn, key))?;

        match raw {
            None => Ok(None),
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Discarding undecodable preference '{}': {}", key, e);
                    Ok(None)
                }
            },
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (key, &text),
            )?;
            Ok(())
        })
    }

    /// Returns true if a value was removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM preferences WHERE key = ?1", [key])?;
            Ok(n > 0)
        })
    }

    // -- Vote/report ledger --

    pub fn ledger_entry(&self, post_id: &PostId) -> Result<Option<LedgerEntry>> {
        self.with_conn(|conn| query_ledger_entry(conn, post_id))
    }

    pub fn vote_state(&self, post_id: &PostId) -> Result<VoteState> {
        Ok(self
            .ledger_entry(post_id)?
            .map(|e| e.vote)
            .unwrap_or_default())
    }

    pub fn is_reported(&self, post_id: &PostId) -> Result<bool> {
        Ok(self.ledger_entry(post_id)?.is_some_and(|e| e.reported))
    }

    pub fn record_vote(&self, post_id: &PostId, vote: VoteState) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vote_ledger (post_id, vote, touched)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(touched), 0) + 1 FROM vote_ledger))
                 ON CONFLICT(post_id) DO UPDATE SET vote = excluded.vote, touched = excluded.touched",
                (post_id.as_str(), vote_to_sql(vote)),
            )?;
            Ok(())
        })?;
        self.prune_ledger(self.ledger_capacity())?;
        Ok(())
    }

    pub fn mark_reported(&self, post_id: &PostId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vote_ledger (post_id, reported, touched)
                 VALUES (?1, 1, (SELECT COALESCE(MAX(touched), 0) + 1 FROM vote_ledger))
                 ON CONFLICT(post_id) DO UPDATE SET reported = 1, touched = excluded.touched",
                [post_id.as_str()],
            )?;
            Ok(())
        })?;
        self.prune_ledger(self.ledger_capacity())?;
        Ok(())
    }

    /// All entries, least recently touched first.
    pub fn ledger(&self) -> Result<Vec<LedgerEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT post_id, vote, reported FROM vote_ledger ORDER BY touched ASC")?;
            let rows = stmt
                .query_map([], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Evicts least recently touched entries beyond `capacity`. Returns how many were dropped.
    pub fn prune_ledger(&self, capacity: usize) -> Result<usize> {
        let dropped = self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM vote_ledger WHERE post_id IN (
                     SELECT post_id FROM vote_ledger ORDER BY touched DESC LIMIT -1 OFFSET ?1
                 )",
                [capacity as i64],
            )?;
            Ok(n)
        })?;

        if dropped > 0 {
            debug!("Evicted {} ledger entries over capacity {}", dropped, capacity);
        }
        Ok(dropped)
    }

    /// Drops vote state for posts the server no longer lists. Reported flags
    /// survive so a report is never re-sent for a post that reappears.
    pub fn retain_posts(&self, live: &[PostId]) -> Result<usize> {
        let live: HashSet<&str> = live.iter().map(|p| p.as_str()).collect();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let stale: Vec<(String, bool)> = {
                let mut stmt = tx.prepare("SELECT post_id, reported FROM vote_ledger")?;
                stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                    .into_iter()
                    .filter(|(id, _)| !live.contains(id.as_str()))
                    .collect()
            };

            for (post_id, reported) in &stale {
                if *reported {
                    tx.execute(
                        "UPDATE vote_ledger SET vote = 'none' WHERE post_id = ?1",
                        [post_id],
                    )?;
                } else {
                    tx.execute("DELETE FROM vote_ledger WHERE post_id = ?1", [post_id])?;
                }
            }
            tx.commit()?;
            Ok(stale.len())
        })
    }
}

pub(crate) fn query_preference(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM preferences WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
}

fn query_ledger_entry(conn: &Connection, post_id: &PostId) -> Result<Option<LedgerEntry>> {
    conn.query_row(
        "SELECT post_id, vote, reported FROM vote_ledger WHERE post_id = ?1",
        [post_id.as_str()],
        row_to_entry,
    )
    .optional()
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let post_id: String = row.get(0)?;
    let vote: String = row.get(1)?;
    Ok(LedgerEntry {
        post_id: PostId::new(post_id),
        vote: vote_from_sql(&vote),
        reported: row.get(2)?,
    })
}

fn vote_to_sql(vote: VoteState) -> &'static str {
    match vote {
        VoteState::None => "none",
        VoteState::Up => "up",
        VoteState::Down => "down",
    }
}

fn vote_from_sql(raw: &str) -> VoteState {
    match raw {
        "up" => VoteState::Up,
        "down" => VoteState::Down,
        _ => VoteState::None,
    }
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
