use anyhow::{Context, Result};
use besties::catalog::spotify::SpotifyClient;
use besties::db::Database;
use besties::db::models::{ArtistRunRecord, RunSummary};
use besties::engagement::reddit::RedditClient;
use besties::graph::GraphWriter;
use besties::graph::neo4j::Neo4jWriter;
use besties::pipeline::{self, EraPlan};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

static CANCELLED: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(
    name = "besties",
    version,
    about = "Era-based discography consolidation for the Music Besties graph"
)]
struct Cli {
    /// Path to the SQLite run ledger
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate artists into eras and write them to Neo4j
    Build {
        /// Spotify artist ids (defaults to config file artists)
        artist_ids: Vec<String>,

        /// Consolidate and record the run without writing to Neo4j
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the era plan for one artist without writing anything
    Eras {
        /// Spotify artist id
        artist_id: String,

        /// Hide per-era track listings
        #[arg(long)]
        summary: bool,
    },

    /// Score an artist's Reddit fan community
    Engagement {
        /// Artist name to search for
        name: String,

        /// Spotify artist id to attach the score to in Neo4j
        #[arg(long)]
        artist_id: Option<String>,

        /// Print the report without writing to Neo4j
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recent batch runs, or one artist's outcomes
    History {
        /// Spotify artist id
        #[arg(long)]
        artist: Option<String>,

        /// Number of results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = besties::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli.db_path
        .or(config.db_path.clone())
        .unwrap_or_else(besties::config::default_db_path);

    match cli.command {
        Commands::Build { artist_ids, dry_run } => {
            // Resolve artists: CLI args > config artists
            let artist_ids = if !artist_ids.is_empty() {
                artist_ids
            } else if !config.artists.is_empty() {
                config.artists.clone()
            } else {
                anyhow::bail!(
                    "No artists to build. \
                     Pass Spotify artist ids as arguments or set artists in config."
                );
            };

            log::info!("Database: {}", db_path.display());
            let db = Database::open(&db_path).context("Failed to open database")?;
            let source = SpotifyClient::new(config.spotify.clone())
                .context("Failed to set up Spotify client")?;
            let writer = (!dry_run).then(|| Neo4jWriter::new(&config.neo4j));

            if let Err(e) = ctrlc::set_handler(|| {
                eprintln!("Interrupted, finishing current artist...");
                CANCELLED.store(true, Ordering::SeqCst);
            }) {
                log::warn!("Could not install Ctrl-C handler: {e}");
            }

            if dry_run {
                println!("DRY RUN: nothing will be written to Neo4j");
            }
            let result = pipeline::run_batch(
                &source,
                writer.as_ref().map(|w| w as &dyn GraphWriter),
                &artist_ids,
                &config.pipeline_context(),
                Some(&db),
                &CANCELLED,
            )
            .context("Failed to record run")?;

            println!();
            println!(
                "{:<24} {:>8} {:>4} {:>6} {:>4}  {}",
                "Artist", "Releases", "Eras", "Tracks", "Gaps", "Status"
            );
            println!("{}", "-".repeat(64));
            for o in &result.outcomes {
                println!(
                    "{:<24} {:>8} {:>4} {:>6} {:>4}  {}",
                    o.artist_id, o.releases, o.eras, o.tracks, o.fetch_gaps, o.status()
                );
            }
            for (artist_id, error) in &result.failures {
                println!(
                    "{:<24} {:>8} {:>4} {:>6} {:>4}  failed: {}",
                    artist_id, "-", "-", "-", "-", error
                );
            }

            println!();
            println!(
                "Build complete: {} processed, {} failed, {} not started",
                result.outcomes.len(),
                result.failures.len(),
                result.skipped
            );
            if let Some(run_id) = result.run_id {
                println!("Recorded as run #{run_id}");
            }
        }

        Commands::Eras { artist_id, summary } => {
            let source = SpotifyClient::new(config.spotify.clone())
                .context("Failed to set up Spotify client")?;
            let catalog = pipeline::fetch_catalog(&source, &artist_id)
                .with_context(|| format!("Failed to fetch discography for {artist_id}"))?;
            let plans = pipeline::plan_eras(&catalog, &config.pipeline_context());

            if plans.is_empty() {
                println!("No releases found for {artist_id}");
                return Ok(());
            }
            for plan in &plans {
                print_era(plan, summary);
            }
            println!(
                "{} releases in {} eras ({} releases without track listings)",
                catalog.releases.len(),
                plans.len(),
                catalog.fetch_gaps.len()
            );
        }

        Commands::Engagement { name, artist_id, dry_run } => {
            let source = RedditClient::new(&config.reddit);
            let now = chrono::Utc::now().timestamp();
            let report = besties::engagement::analyze_artist(&source, &name, &config.reddit, now)
                .with_context(|| format!("Engagement lookup failed for {name}"))?;

            let Some(report) = report else {
                println!("No qualifying fan subreddit found for {name}");
                return Ok(());
            };

            println!("Artist:           {}", report.artist);
            println!("Subreddit:        r/{}", report.subreddit);
            println!("Subscribers:      {}", report.subscribers);
            println!(
                "Activity ({}d):    {} posts + comments",
                config.reddit.window_days, report.monthly_activity
            );
            println!("Engagement score: {:.2} per 1k subscribers", report.engagement_score);

            match (artist_id, dry_run) {
                (Some(id), false) => {
                    Neo4jWriter::new(&config.neo4j)
                        .write_engagement(&id, &report)
                        .context("Failed to write engagement to Neo4j")?;
                    println!("Written to artist {id}");
                }
                (Some(_), true) => println!("(dry run: re-run without --dry-run to write)"),
                (None, _) => {}
            }
        }

        Commands::History { artist, limit } => {
            let db = Database::open(&db_path).context("Failed to open database")?;
            match artist {
                Some(artist_id) => {
                    let records = db.artist_history(&artist_id, limit)?;
                    if records.is_empty() {
                        println!("No runs recorded for {artist_id}");
                    } else {
                        print_artist_history(&records);
                    }
                }
                None => {
                    let runs = db.recent_runs(limit)?;
                    if runs.is_empty() {
                        println!("No runs recorded yet.");
                    } else {
                        print_runs(&runs);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Print one era: primary, members and (unless `summary`) the canonical tracks.
fn print_era(plan: &EraPlan, summary: bool) {
    let era = &plan.era;
    let range = match (era.start_date, era.end_date) {
        (Some(start), Some(end)) => format!("{start} .. {end}"),
        _ => "undated".to_string(),
    };
    println!("{}  [{}]", era.name, range);
    println!("  primary: {} ({})", era.primary.name, era.primary.kind);

    for r in &era.members {
        let date = r.release_date.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string());
        println!("  {:<10} {:<13} {}", date, r.kind.as_str(), r.name);
    }

    if !summary {
        println!("  {}", "-".repeat(60));
        for (i, c) in plan.tracks.iter().enumerate() {
            let name: String = if c.track.name.chars().count() > 40 {
                format!("{}...", c.track.name.chars().take(37).collect::<String>())
            } else {
                c.track.name.clone()
            };
            let tags: Vec<&str> = c.tags.iter().map(|t| t.as_str()).collect();
            println!("  {:>3}. {:<40} {}", i + 1, name, tags.join(", "));
        }
    }
    println!();
}

/// Print a table of batch runs.
fn print_runs(runs: &[RunSummary]) {
    println!(
        "{:>5}  {:<19}  {:<7} {:>6} {:>4} {:>6} {:>6}",
        "Run", "Started", "Mode", "Total", "OK", "Empty", "Failed"
    );
    println!("{}", "-".repeat(62));

    for r in runs {
        let mode = match (r.dry_run, r.finished_at.is_some()) {
            (_, false) => "running",
            (true, true) => "dry-run",
            (false, true) => "write",
        };
        println!(
            "{:>5}  {:<19}  {:<7} {:>6} {:>4} {:>6} {:>6}",
            r.id,
            r.started_at,
            mode,
            r.artists_total,
            r.artists_ok,
            r.artists_empty,
            r.artists_failed
        );
    }
}

/// Print one artist's outcomes across runs.
fn print_artist_history(records: &[ArtistRunRecord]) {
    println!(
        "{:>5}  {:<19}  {:<10} {:>8} {:>4} {:>6} {:>4}",
        "Run", "When", "Status", "Releases", "Eras", "Tracks", "Gaps"
    );
    println!("{}", "-".repeat(66));

    for r in records {
        println!(
            "{:>5}  {:<19}  {:<10} {:>8} {:>4} {:>6} {:>4}",
            r.run_id, r.created_at, r.status, r.releases, r.eras, r.tracks, r.fetch_gaps
        );
        if let Some(error) = &r.error {
            println!("       {error}");
        }
    }
}
