pub mod migrations;
pub mod models;
pub mod prefs;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Default bound on the vote/report ledger.
pub const DEFAULT_LEDGER_CAPACITY: usize = 500;

/// Per-device key-value store for user-local state.
///
/// Nothing in here is authoritative for counts other users see; it only
/// seeds optimistic UI state until the server answers.
pub struct LocalStore {
    conn: Mutex<Connection>,
    ledger_capacity: usize,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Local store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
        })
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity.max(1);
        self
    }

    pub fn ledger_capacity(&self) -> usize {
        self.ledger_capacity
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))?;
        f(&mut conn)
    }
}
