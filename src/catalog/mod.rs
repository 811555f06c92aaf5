pub mod spotify;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Spotify request failed: {0}")]
    Spotify(#[from] rspotify::ClientError),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Invalid Spotify id '{0}'")]
    InvalidId(String),
    #[error("Invalid Spotify configuration: {0}")]
    Config(String),
}

/// Where a release sits in an artist's discography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseKind {
    StudioAlbum,
    Single,
    Compilation,
    AppearsOn,
}

impl ReleaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StudioAlbum => "studio_album",
            Self::Single => "single",
            Self::Compilation => "compilation",
            Self::AppearsOn => "appears_on",
        }
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a release date the source actually knew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// A release date with partial precision. Missing month/day components are
/// filled with 1, so "2019" orders before "2019-08-23". Equal dates order by
/// precision; era consolidation sorts on `date()` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReleaseDate {
    date: NaiveDate,
    precision: DatePrecision,
}

impl ReleaseDate {
    /// Parse "YYYY", "YYYY-MM" or "YYYY-MM-DD" (anything past the day is ignored).
    /// Year 0 is how some sources spell "unknown" and yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let s = s.get(..10).unwrap_or(s);
        let mut parts = s.split('-');

        let year: i32 = parts.next()?.parse().ok()?;
        if year <= 0 {
            return None;
        }

        let (month, day, precision) = match (parts.next(), parts.next()) {
            (None, _) => (1, 1, DatePrecision::Year),
            (Some(m), None) => (m.parse().ok()?, 1, DatePrecision::Month),
            (Some(m), Some(d)) => (m.parse().ok()?, d.parse().ok()?, DatePrecision::Day),
        };

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self { date, precision })
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|date| Self {
            date,
            precision: DatePrecision::Day,
        })
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn precision(&self) -> DatePrecision {
        self.precision
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Signed distance in fractional years from `self` to `later`.
    pub fn years_until(&self, later: &ReleaseDate) -> f64 {
        (later.date - self.date).num_days() as f64 / 365.25
    }
}

impl PartialOrd for ReleaseDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then(self.precision.cmp(&other.precision))
    }
}

impl fmt::Display for ReleaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            DatePrecision::Year => write!(f, "{}", self.date.format("%Y")),
            DatePrecision::Month => write!(f, "{}", self.date.format("%Y-%m")),
            DatePrecision::Day => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for ReleaseDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A discography entry. Every field is already defaulted by the adapter that
/// produced it: empty label, empty genres, popularity 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Release {
    pub id: String,
    pub name: String,
    pub kind: ReleaseKind,
    pub release_date: Option<ReleaseDate>,
    pub track_count: u32,
    pub label: String,
    pub genres: BTreeSet<String>,
    pub popularity: u8,
}

impl Release {
    pub fn year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    pub fn is_studio_album(&self) -> bool {
        self.kind == ReleaseKind::StudioAlbum
    }
}

/// Numeric audio signals for one track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub key: i32,
    pub loudness: f64,
    pub mode: i32,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub time_signature: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub explicit: bool,
    pub disc_number: u32,
    pub track_number: u32,
    pub audio_features: Option<AudioFeatures>,
}

/// A metadata service that can list an artist's discography.
///
/// Implementations own their network session; the consolidation code only
/// ever sees the typed records returned here.
pub trait CatalogSource {
    fn list_releases(&self, artist_id: &str) -> Result<Vec<Release>, FetchError>;
    fn list_tracks(&self, release_id: &str) -> Result<Vec<Track>, FetchError>;
}
