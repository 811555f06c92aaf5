//! Per-artist processing: fetch → consolidate → tag → write.
//!
//! Artists are processed one at a time. Fetch failures on a single release
//! shrink the input (a "fetch gap"); failures listing the discography or
//! writing the graph fail that artist only. Neither stops the batch.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{CatalogSource, FetchError, Release, Track};
use crate::db::models::NewArtistRun;
use crate::db::{Database, DbError};
use crate::era::{self, Era, EraConfig};
use crate::graph::{GraphError, GraphWriter};
use crate::tags::{self, Tag, TagConfig};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Catalog fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Graph write failed: {0}")]
    Graph(#[from] GraphError),
}

/// Settings threaded through the pure consolidation and tagging steps.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub era: EraConfig,
    pub tags: TagConfig,
}

/// One deduplicated song within an era, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTrack {
    pub track: Track,
    pub tags: BTreeSet<Tag>,
    /// Ids of every member release the track was found on, in era order.
    pub source_releases: Vec<String>,
}

/// Everything fetched for one artist.
#[derive(Debug, Clone, Default)]
pub struct ArtistCatalog {
    pub artist_id: String,
    pub releases: Vec<Release>,
    /// Track listings keyed by release id. Releases whose listing failed are absent.
    pub tracks: HashMap<String, Vec<Track>>,
    /// Release ids whose track listing could not be fetched.
    pub fetch_gaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EraPlan {
    pub era: Era,
    pub tracks: Vec<CanonicalTrack>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistOutcome {
    pub artist_id: String,
    pub releases: usize,
    pub eras: usize,
    pub tracks: usize,
    pub fetch_gaps: usize,
}

impl ArtistOutcome {
    fn empty(artist_id: &str) -> Self {
        Self {
            artist_id: artist_id.to_string(),
            releases: 0,
            eras: 0,
            tracks: 0,
            fetch_gaps: 0,
        }
    }

    /// Ledger status: an artist without releases is "no_catalog", not a failure.
    pub fn status(&self) -> &'static str {
        if self.releases == 0 { "no_catalog" } else { "ok" }
    }
}

pub struct BatchResult {
    pub run_id: Option<i64>,
    pub outcomes: Vec<ArtistOutcome>,
    /// `(artist_id, error message)`
    pub failures: Vec<(String, String)>,
    /// Artists never started because the batch was cancelled.
    pub skipped: usize,
}

/// List an artist's releases and the tracks of each one.
///
/// Only the release listing can fail; a release whose tracks cannot be
/// fetched is recorded as a fetch gap and contributes no tracks.
pub fn fetch_catalog(
    source: &dyn CatalogSource,
    artist_id: &str,
) -> Result<ArtistCatalog, FetchError> {
    let releases = source.list_releases(artist_id)?;
    let mut catalog = ArtistCatalog {
        artist_id: artist_id.to_string(),
        tracks: HashMap::with_capacity(releases.len()),
        ..Default::default()
    };

    for release in &releases {
        match source.list_tracks(&release.id) {
            Ok(tracks) => {
                log::debug!("  {} ({}): {} tracks", release.name, release.id, tracks.len());
                catalog.tracks.insert(release.id.clone(), tracks);
            }
            Err(e) => {
                log::warn!("Tracks unavailable for '{}' ({}): {e}", release.name, release.id);
                catalog.fetch_gaps.push(release.id.clone());
            }
        }
    }

    catalog.releases = releases;
    Ok(catalog)
}

/// Collapse the tracks of an era's member releases to one entry per track id.
///
/// Members are walked in era order and each listing in disc/track order, so
/// the first occurrence supplies the track record and its position.
pub fn canonical_tracks(
    era: &Era,
    tracks: &HashMap<String, Vec<Track>>,
    config: &TagConfig,
) -> Vec<CanonicalTrack> {
    let mut canonical: Vec<CanonicalTrack> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for release in &era.members {
        let Some(listing) = tracks.get(&release.id) else {
            continue;
        };
        let mut listing: Vec<&Track> = listing.iter().collect();
        listing.sort_by_key(|t| (t.disc_number, t.track_number));

        for track in listing {
            match index.get(&track.id) {
                Some(&i) => {
                    let entry = &mut canonical[i];
                    if !entry.source_releases.contains(&release.id) {
                        entry.source_releases.push(release.id.clone());
                    }
                    if entry.track.audio_features.is_none() {
                        entry.track.audio_features = track.audio_features;
                    }
                }
                None => {
                    index.insert(track.id.clone(), canonical.len());
                    canonical.push(CanonicalTrack {
                        track: track.clone(),
                        tags: BTreeSet::new(),
                        source_releases: vec![release.id.clone()],
                    });
                }
            }
        }
    }

    for entry in &mut canonical {
        let sources: Vec<&Release> = entry
            .source_releases
            .iter()
            .filter_map(|id| era.member(id))
            .collect();
        entry.tags = tags::generate_tags(&entry.track, &sources, config);
    }

    canonical
}

/// Consolidate a fetched catalog into eras with their canonical track lists.
pub fn plan_eras(catalog: &ArtistCatalog, ctx: &PipelineContext) -> Vec<EraPlan> {
    era::consolidate(&catalog.releases, &ctx.era)
        .into_iter()
        .map(|era| {
            let tracks = canonical_tracks(&era, &catalog.tracks, &ctx.tags);
            EraPlan { era, tracks }
        })
        .collect()
}

/// Fetch, consolidate and (unless `writer` is `None`) persist one artist.
pub fn process_artist(
    source: &dyn CatalogSource,
    writer: Option<&dyn GraphWriter>,
    artist_id: &str,
    ctx: &PipelineContext,
) -> Result<ArtistOutcome, PipelineError> {
    let catalog = fetch_catalog(source, artist_id)?;

    if catalog.releases.is_empty() {
        log::info!("Artist {artist_id} has no releases");
        return Ok(ArtistOutcome::empty(artist_id));
    }

    let plans = plan_eras(&catalog, ctx);
    log::info!(
        "Artist {artist_id}: {} releases -> {} eras",
        catalog.releases.len(),
        plans.len()
    );

    if let Some(writer) = writer {
        writer.replace_artist(artist_id, &plans)?;
    }

    Ok(ArtistOutcome {
        artist_id: artist_id.to_string(),
        releases: catalog.releases.len(),
        eras: plans.len(),
        tracks: plans.iter().map(|p| p.tracks.len()).sum(),
        fetch_gaps: catalog.fetch_gaps.len(),
    })
}

/// Process artists sequentially. Per-artist errors are logged and collected;
/// only ledger errors abort. `cancel` is checked before each artist starts.
pub fn run_batch(
    source: &dyn CatalogSource,
    writer: Option<&dyn GraphWriter>,
    artist_ids: &[String],
    ctx: &PipelineContext,
    ledger: Option<&Database>,
    cancel: &AtomicBool,
) -> Result<BatchResult, DbError> {
    let run_id = match ledger {
        Some(db) => Some(db.start_run(writer.is_none())?),
        None => None,
    };

    let pb = ProgressBar::new(artist_ids.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} artists {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );

    let mut result = BatchResult {
        run_id,
        outcomes: Vec::new(),
        failures: Vec::new(),
        skipped: 0,
    };

    for (i, artist_id) in artist_ids.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            result.skipped = artist_ids.len() - i;
            log::warn!("Cancelled; {} artists not started", result.skipped);
            break;
        }
        pb.set_message(artist_id.clone());

        let (status, error, outcome) = match process_artist(source, writer, artist_id, ctx) {
            Ok(outcome) => {
                result.outcomes.push(outcome.clone());
                (outcome.status(), None, outcome)
            }
            Err(e) => {
                log::warn!("Artist {artist_id} failed: {e}");
                let message = e.to_string();
                result.failures.push((artist_id.clone(), message.clone()));
                ("failed", Some(message), ArtistOutcome::empty(artist_id))
            }
        };

        if let (Some(db), Some(run_id)) = (ledger, run_id) {
            db.record_artist_run(&NewArtistRun {
                run_id,
                artist_id,
                status,
                releases: outcome.releases as i64,
                eras: outcome.eras as i64,
                tracks: outcome.tracks as i64,
                fetch_gaps: outcome.fetch_gaps as i64,
                error: error.as_deref(),
            })?;
        }

        pb.inc(1);
    }

    if let (Some(db), Some(run_id)) = (ledger, run_id) {
        db.finish_run(run_id)?;
    }

    pb.finish_with_message("done");
    Ok(result)
}
