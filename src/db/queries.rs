use super::models::{ArtistRunRecord, NewArtistRun, RunSummary};
use super::{Database, Result};
use rusqlite::params;

impl Database {
    /// Open a new run row. Returns the run id.
    pub fn start_run(&self, dry_run: bool) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO runs (dry_run) VALUES (?1)",
            params![dry_run],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn record_artist_run(&self, r: &NewArtistRun) -> Result<()> {
        self.conn.execute(
            "INSERT INTO artist_runs (
                run_id, artist_id, status, releases, eras, tracks, fetch_gaps, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.run_id, r.artist_id, r.status, r.releases,
                r.eras, r.tracks, r.fetch_gaps, r.error,
            ],
        )?;
        Ok(())
    }

    /// Close a run, rolling the per-artist rows up into its totals.
    pub fn finish_run(&self, run_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET
                finished_at = datetime('now'),
                artists_total = (SELECT COUNT(*) FROM artist_runs WHERE run_id = ?1),
                artists_ok = (SELECT COUNT(*) FROM artist_runs WHERE run_id = ?1 AND status = 'ok'),
                artists_empty = (SELECT COUNT(*) FROM artist_runs WHERE run_id = ?1 AND status = 'no_catalog'),
                artists_failed = (SELECT COUNT(*) FROM artist_runs WHERE run_id = ?1 AND status = 'failed')
             WHERE id = ?1",
            params![run_id],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, dry_run,
                    artists_total, artists_ok, artists_empty, artists_failed
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunSummary {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    dry_run: row.get(3)?,
                    artists_total: row.get(4)?,
                    artists_ok: row.get(5)?,
                    artists_empty: row.get(6)?,
                    artists_failed: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Outcomes for one artist, most recent first.
    pub fn artist_history(&self, artist_id: &str, limit: usize) -> Result<Vec<ArtistRunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, artist_id, status, releases, eras, tracks, fetch_gaps, error, created_at
             FROM artist_runs WHERE artist_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![artist_id, limit as i64], |row| {
                Ok(ArtistRunRecord {
                    run_id: row.get(0)?,
                    artist_id: row.get(1)?,
                    status: row.get(2)?,
                    releases: row.get(3)?,
                    eras: row.get(4)?,
                    tracks: row.get(5)?,
                    fetch_gaps: row.get(6)?,
                    error: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}
