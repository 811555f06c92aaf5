/// Outcome of one artist within a run, as written to the ledger.
pub struct NewArtistRun<'a> {
    pub run_id: i64,
    pub artist_id: &'a str,
    pub status: &'a str,
    pub releases: i64,
    pub eras: i64,
    pub tracks: i64,
    pub fetch_gaps: i64,
    pub error: Option<&'a str>,
}

/// A batch run read back from the ledger.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub dry_run: bool,
    pub artists_total: i64,
    pub artists_ok: i64,
    pub artists_empty: i64,
    pub artists_failed: i64,
}

#[derive(Debug, Clone)]
pub struct ArtistRunRecord {
    pub run_id: i64,
    pub artist_id: String,
    pub status: String,
    pub releases: i64,
    pub eras: i64,
    pub tracks: i64,
    pub fetch_gaps: i64,
    pub error: Option<String>,
    pub created_at: String,
}
