pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Local ledger of batch runs and per-artist outcomes.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", 1)?;
        Ok(())
    }

    /// V1: runs + artist_runs
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at      TEXT NOT NULL DEFAULT (datetime('now')),
                finished_at     TEXT,
                dry_run         INTEGER NOT NULL DEFAULT 0,
                artists_total   INTEGER NOT NULL DEFAULT 0,
                artists_ok      INTEGER NOT NULL DEFAULT 0,
                artists_empty   INTEGER NOT NULL DEFAULT 0,
                artists_failed  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS artist_runs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id          INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                artist_id       TEXT NOT NULL,
                -- ok | no_catalog | failed
                status          TEXT NOT NULL,
                releases        INTEGER NOT NULL DEFAULT 0,
                eras            INTEGER NOT NULL DEFAULT 0,
                tracks          INTEGER NOT NULL DEFAULT 0,
                fetch_gaps      INTEGER NOT NULL DEFAULT 0,
                error           TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_artist_runs_run ON artist_runs(run_id);
            CREATE INDEX IF NOT EXISTS idx_artist_runs_artist ON artist_runs(artist_id);
            ",
        )?;
        Ok(())
    }
}
