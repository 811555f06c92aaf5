//! Community engagement scoring from Reddit.
//!
//! For an artist, find the subreddit that is actually about them (not a
//! parody or meme spin-off), count the last month of activity on it and
//! express it as activity per thousand subscribers:
//!
//! `engagement_score = (monthly_activity / subscribers) * 1000`

pub mod reddit;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngagementError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("Unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Rate limited by Reddit: {0}")]
    RateLimited(String),
}

/// Words that mark a community as a joke about the artist rather than a fan base.
const PARODY_MARKERS: &[&str] = &["circlejerk", "parody", "satire", "shitpost"];

/// Weaker markers: fan communities mention memes in their descriptions,
/// so these only count in the subreddit name or title.
const JOKE_MARKERS: &[&str] = &["jerk", "meme", "hate"];

fn marker_regex(markers: &[&str]) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})s?\b", markers.join("|"))).unwrap()
}

static TITLE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| marker_regex(&[PARODY_MARKERS, JOKE_MARKERS].concat()));
static DESCRIPTION_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| marker_regex(PARODY_MARKERS));

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    /// Reddit rejects requests without a descriptive User-Agent.
    pub user_agent: String,
    /// Candidates below this subscriber count are ignored.
    pub min_subscribers: u64,
    /// Length of the activity window in days.
    pub window_days: i64,
    /// Upper bound on listing pages fetched per subreddit.
    pub max_pages: usize,
    /// Number of subreddit search results to consider.
    pub search_limit: u32,
    pub rate_limit_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "{}/{} (music graph enrichment)",
                crate::APP_NAME,
                env!("CARGO_PKG_VERSION")
            ),
            min_subscribers: 100,
            window_days: 30,
            max_pages: 10,
            search_limit: 25,
            rate_limit_ms: 1000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubredditCandidate {
    pub name: String,
    pub title: String,
    pub description: String,
    pub subscribers: u64,
    pub over18: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Post {
    pub created_utc: i64,
    pub num_comments: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostPage {
    /// Newest first.
    pub posts: Vec<Post>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementReport {
    pub artist: String,
    pub subreddit: String,
    pub subscribers: u64,
    pub monthly_activity: u64,
    pub engagement_score: f64,
}

/// A community platform that can be searched and paged through.
pub trait CommunitySource {
    fn search_subreddits(&self, query: &str) -> Result<Vec<SubredditCandidate>, EngagementError>;
    fn new_posts(&self, subreddit: &str, after: Option<&str>) -> Result<PostPage, EngagementError>;
}

/// Lowercase alphanumerics only: "Taylor Swift" → "taylorswift".
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Subreddit names have no word breaks, so the artist's own name is cut out
/// and each remaining piece is checked for a leading or trailing marker.
fn name_has_marker(name: &str, artist_key: &str) -> bool {
    let name = normalize(name);
    let pieces: Vec<&str> = if artist_key.is_empty() {
        vec![name.as_str()]
    } else {
        name.split(artist_key).collect()
    };
    pieces.iter().map(|p| p.trim_end_matches('s')).any(|piece| {
        PARODY_MARKERS
            .iter()
            .chain(JOKE_MARKERS)
            .any(|m| piece.starts_with(m) || piece.ends_with(m))
    })
}

/// NSFW, or named/described as a joke about `artist`. Markers that are part of
/// the artist's own name ("Hatebreed") never count.
pub fn is_parody(candidate: &SubredditCandidate, artist: &str) -> bool {
    if candidate.over18 {
        return true;
    }
    let artist_key = normalize(artist);
    let foreign = |word: &str| {
        let word = word.to_lowercase();
        artist_key.is_empty() || !artist_key.contains(word.trim_end_matches('s'))
    };

    name_has_marker(&candidate.name, &artist_key)
        || TITLE_MARKER_RE
            .find_iter(&candidate.title)
            .any(|m| foreign(m.as_str()))
        || DESCRIPTION_MARKER_RE
            .find_iter(&candidate.description)
            .any(|m| foreign(m.as_str()))
}

pub fn matches_artist(candidate: &SubredditCandidate, artist: &str) -> bool {
    let needle = normalize(artist);
    !needle.is_empty()
        && (normalize(&candidate.name).contains(&needle)
            || normalize(&candidate.title).contains(&needle))
}

/// Activity per thousand subscribers; 0 for an empty community.
pub fn engagement_score(monthly_activity: u64, subscribers: u64) -> f64 {
    if subscribers == 0 {
        return 0.0;
    }
    monthly_activity as f64 / subscribers as f64 * 1000.0
}

/// Sum posts and comments newer than `cutoff` on one page.
/// Returns `(activity, reached_cutoff)`; pages are newest first, so the first
/// post older than the cutoff ends the window.
pub fn tally_page(posts: &[Post], cutoff: i64) -> (u64, bool) {
    let mut activity = 0;
    for post in posts {
        if post.created_utc < cutoff {
            return (activity, true);
        }
        activity += 1 + post.num_comments;
    }
    (activity, false)
}

/// Posts plus comments in the last `window_days`, paging until the window is
/// covered, the listing ends, or `max_pages` is hit.
pub fn monthly_activity(
    source: &dyn CommunitySource,
    subreddit: &str,
    config: &RedditConfig,
    now: i64,
) -> Result<u64, EngagementError> {
    let cutoff = now - config.window_days * 24 * 60 * 60;
    let mut total = 0;
    let mut after: Option<String> = None;

    for page_no in 1..=config.max_pages {
        let page = source.new_posts(subreddit, after.as_deref())?;
        let (activity, reached_cutoff) = tally_page(&page.posts, cutoff);
        total += activity;

        if reached_cutoff || page.after.is_none() || page.posts.is_empty() {
            return Ok(total);
        }
        if page_no == config.max_pages {
            log::warn!("r/{subreddit}: stopped after {page_no} pages before covering the window");
        }
        after = page.after;
    }

    Ok(total)
}

/// Candidates that plausibly represent the artist's fan community.
pub fn fan_communities(
    candidates: Vec<SubredditCandidate>,
    artist: &str,
    min_subscribers: u64,
) -> Vec<SubredditCandidate> {
    candidates
        .into_iter()
        .filter(|c| {
            if is_parody(c, artist) {
                log::debug!("Skipping r/{}: parody or NSFW", c.name);
                return false;
            }
            matches_artist(c, artist) && c.subscribers >= min_subscribers
        })
        .collect()
}

/// Discover the artist's main subreddit and score it. `None` when no
/// community qualifies.
pub fn analyze_artist(
    source: &dyn CommunitySource,
    artist: &str,
    config: &RedditConfig,
    now: i64,
) -> Result<Option<EngagementReport>, EngagementError> {
    let candidates = source.search_subreddits(artist)?;
    log::info!("{artist}: {} subreddit candidates", candidates.len());

    let Some(best) = fan_communities(candidates, artist, config.min_subscribers)
        .into_iter()
        .max_by_key(|c| c.subscribers)
    else {
        return Ok(None);
    };

    let activity = monthly_activity(source, &best.name, config, now)?;
    Ok(Some(EngagementReport {
        artist: artist.to_string(),
        engagement_score: engagement_score(activity, best.subscribers),
        subreddit: best.name,
        subscribers: best.subscribers,
        monthly_activity: activity,
    }))
}
