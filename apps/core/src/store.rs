use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::history::HistoryEntry;
use crate::pin::PinKey;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create state directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoredHistory = HashMap<String, HashMap<String, HistoryEntry>>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS history (
    source_id TEXT NOT NULL,
    item_key  TEXT NOT NULL,
    last_used INTEGER NOT NULL,
    uses      INTEGER NOT NULL,
    PRIMARY KEY (source_id, item_key)
);
CREATE TABLE IF NOT EXISTS pins (
    query_context TEXT NOT NULL,
    item_key      TEXT NOT NULL,
    PRIMARY KEY (query_context, item_key)
);
";

pub struct StateStore {
    db: Connection,
}

impl StateStore {
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    pub fn open_file(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn with_connection(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }

    pub fn load_history(&self) -> Result<StoredHistory, StoreError> {
        let mut stmt = self
            .db
            .prepare("SELECT source_id, item_key, last_used, uses FROM history")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                HistoryEntry {
                    last_used: row.get(2)?,
                    uses: row.get(3)?,
                },
            ))
        })?;

        let mut history = StoredHistory::new();
        for row in rows {
            let (source_id, item_key, entry) = row?;
            history.entry(source_id).or_default().insert(item_key, entry);
        }
        Ok(history)
    }

    pub fn save_history(
        &mut self,
        history: &HashMap<String, Vec<(String, HistoryEntry)>>,
    ) -> Result<(), StoreError> {
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM history", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO history (source_id, item_key, last_used, uses) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(source_id, item_key) DO UPDATE SET last_used=excluded.last_used, uses=excluded.uses",
            )?;
            for (source_id, entries) in history {
                for (item_key, entry) in entries {
                    insert.execute(params![source_id, item_key, entry.last_used, entry.uses])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_pins(&self) -> Result<Vec<PinKey>, StoreError> {
        let mut stmt = self
            .db
            .prepare("SELECT query_context, item_key FROM pins ORDER BY query_context, item_key")?;
        let rows = stmt.query_map([], |row| {
            Ok(PinKey {
                query_context: row.get(0)?,
                item_key: row.get(1)?,
            })
        })?;
        let mut pins = Vec::new();
        for row in rows {
            pins.push(row?);
        }
        Ok(pins)
    }

    pub fn save_pins(&mut self, pins: &[PinKey]) -> Result<(), StoreError> {
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM pins", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO pins (query_context, item_key) VALUES (?1, ?2)",
            )?;
            for pin in pins {
                insert.execute(params![pin.query_context, pin.item_key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.db
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}
