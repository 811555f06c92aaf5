//! Spotify Web API adapter on top of rspotify's blocking client.
//!
//! All payload defaulting happens here so that the rest of the crate only
//! sees complete `Release` / `Track` records.

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use rspotify::model::{
    AlbumId, AlbumType, ArtistId, AudioFeatures as SpotifyAudioFeatures, Country, FullAlbum,
    Market, Modality, SimplifiedTrack, TrackId,
};
use rspotify::prelude::*;
use rspotify::{ClientCredsSpotify, Config, Credentials};
use serde::Deserialize;

use super::{AudioFeatures, CatalogSource, FetchError, Release, ReleaseDate, ReleaseKind, Track};

/// Spotify caps the several-albums endpoint at 20 ids per call.
const ALBUM_BATCH: usize = 20;
/// ... and the audio-features endpoint at 100.
const FEATURE_BATCH: usize = 100;

/// Spotify API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// ISO country code used to filter regional duplicates (e.g. "US").
    pub market: Option<String>,
    /// Album groups to list: album, single, compilation, appears_on.
    pub include_groups: Vec<String>,
    /// Delay between API requests in milliseconds.
    pub rate_limit_ms: u64,
    /// Also fetch per-track audio features (not available to every app).
    pub fetch_audio_features: bool,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            market: None,
            include_groups: vec![
                "album".to_string(),
                "single".to_string(),
                "compilation".to_string(),
                "appears_on".to_string(),
            ],
            rate_limit_ms: 100,
            fetch_audio_features: false,
        }
    }
}

fn album_group(name: &str) -> Option<AlbumType> {
    match name.trim().to_lowercase().as_str() {
        "album" => Some(AlbumType::Album),
        "single" => Some(AlbumType::Single),
        "compilation" => Some(AlbumType::Compilation),
        "appears_on" => Some(AlbumType::AppearsOn),
        _ => None,
    }
}

fn parse_market(code: &str) -> Result<Market, FetchError> {
    let code = code.trim().to_uppercase();
    serde_json::from_value::<Country>(serde_json::Value::String(code.clone()))
        .map(Market::Country)
        .map_err(|_| FetchError::Config(format!("unknown market '{code}'")))
}

/// Map the album type and the group it was listed under onto a release kind.
fn release_kind(album_type: AlbumType, group: AlbumType) -> ReleaseKind {
    if matches!(group, AlbumType::AppearsOn) {
        return ReleaseKind::AppearsOn;
    }
    match album_type {
        AlbumType::Album => ReleaseKind::StudioAlbum,
        AlbumType::Compilation => ReleaseKind::Compilation,
        _ => ReleaseKind::Single,
    }
}

fn normalize_label(label: Option<String>) -> String {
    label.unwrap_or_default().trim().to_string()
}

fn normalize_genres(genres: Vec<String>) -> BTreeSet<String> {
    genres
        .into_iter()
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
        .collect()
}

fn into_release(album: FullAlbum, group: AlbumType) -> Release {
    Release {
        id: album.id.id().to_string(),
        release_date: ReleaseDate::parse(&album.release_date),
        kind: release_kind(album.album_type, group),
        track_count: album.tracks.total,
        label: normalize_label(album.label),
        genres: normalize_genres(album.genres),
        popularity: album.popularity.min(100) as u8,
        name: album.name,
    }
}

fn into_track(t: SimplifiedTrack) -> Option<Track> {
    // Local files in a listing have no id and cannot be linked
    let id = t.id?.id().to_string();
    Some(Track {
        id,
        name: t.name,
        duration_ms: t.duration.num_milliseconds().max(0) as u64,
        explicit: t.explicit,
        disc_number: u32::try_from(t.disc_number).unwrap_or(1),
        track_number: t.track_number,
        audio_features: None,
    })
}

fn into_audio_features(f: &SpotifyAudioFeatures) -> AudioFeatures {
    AudioFeatures {
        danceability: f64::from(f.danceability),
        energy: f64::from(f.energy),
        key: f.key,
        loudness: f64::from(f.loudness),
        mode: match f.mode {
            Modality::Major => 1,
            Modality::Minor => 0,
            _ => -1,
        },
        speechiness: f64::from(f.speechiness),
        acousticness: f64::from(f.acousticness),
        instrumentalness: f64::from(f.instrumentalness),
        liveness: f64::from(f.liveness),
        valence: f64::from(f.valence),
        tempo: f64::from(f.tempo),
        time_signature: f.time_signature,
    }
}

pub struct SpotifyClient {
    spotify: ClientCredsSpotify,
    market: Option<Market>,
    groups: Vec<AlbumType>,
    rate_limit: Duration,
    fetch_audio_features: bool,
}

impl SpotifyClient {
    /// Build the client and request a client-credentials token.
    pub fn new(config: SpotifyConfig) -> Result<Self, FetchError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(FetchError::Auth(
                "Spotify client id/secret not configured \
                 (set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET)"
                    .into(),
            ));
        }
        let market = config.market.as_deref().map(parse_market).transpose()?;
        let groups = config
            .include_groups
            .iter()
            .filter_map(|g| {
                let group = album_group(g);
                if group.is_none() {
                    log::warn!("Ignoring unknown Spotify album group '{g}'");
                }
                group
            })
            .collect();

        let spotify = ClientCredsSpotify::with_config(
            Credentials::new(&config.client_id, &config.client_secret),
            Config {
                token_refreshing: true,
                ..Default::default()
            },
        );
        log::debug!("Requesting Spotify access token");
        spotify.request_token()?;

        Ok(Self {
            spotify,
            market,
            groups,
            rate_limit: Duration::from_millis(config.rate_limit_ms),
            fetch_audio_features: config.fetch_audio_features,
        })
    }

    fn pause(&self) {
        thread::sleep(self.rate_limit);
    }

    fn attach_audio_features(&self, tracks: &mut [Track]) {
        for chunk in tracks.chunks_mut(FEATURE_BATCH) {
            let ids: Vec<TrackId<'static>> = chunk
                .iter()
                .filter_map(|t| TrackId::from_id(t.id.clone()).ok())
                .collect();
            self.pause();
            match self.spotify.tracks_features(ids) {
                Ok(Some(features)) => {
                    for f in &features {
                        if let Some(track) = chunk.iter_mut().find(|t| t.id == f.id.id()) {
                            track.audio_features = Some(into_audio_features(f));
                        }
                    }
                }
                Ok(None) => log::debug!("No audio features for {} tracks", chunk.len()),
                Err(e) => log::warn!("Audio features unavailable for {} tracks: {e}", chunk.len()),
            }
        }
    }
}

impl CatalogSource for SpotifyClient {
    fn list_releases(&self, artist_id: &str) -> Result<Vec<Release>, FetchError> {
        let artist = ArtistId::from_id(artist_id)
            .map_err(|_| FetchError::InvalidId(artist_id.to_string()))?;
        let mut releases = Vec::new();

        // One listing per group, so each release knows the group it came from
        for &group in &self.groups {
            let mut listed: Vec<AlbumId<'static>> = Vec::new();
            self.pause();
            let listing = self.spotify.artist_albums(artist.clone(), [group], self.market.clone());
            for album in listing {
                if let Some(id) = album?.id {
                    listed.push(id);
                }
            }
            log::debug!("Artist {artist_id}: {} releases in group {group:?}", listed.len());

            for batch in listed.chunks(ALBUM_BATCH) {
                self.pause();
                match self.spotify.albums(batch.to_vec(), self.market.clone()) {
                    Ok(albums) => {
                        if albums.len() < batch.len() {
                            log::warn!(
                                "{} of {} releases had no detail payload, skipping them",
                                batch.len() - albums.len(),
                                batch.len()
                            );
                        }
                        releases.extend(albums.into_iter().map(|a| into_release(a, group)));
                    }
                    Err(e) => log::warn!(
                        "Album details unavailable for {} releases, skipping them: {e}",
                        batch.len()
                    ),
                }
            }
        }

        log::info!("Artist {artist_id}: {} releases listed", releases.len());
        Ok(releases)
    }

    fn list_tracks(&self, release_id: &str) -> Result<Vec<Track>, FetchError> {
        let album = AlbumId::from_id(release_id)
            .map_err(|_| FetchError::InvalidId(release_id.to_string()))?;

        self.pause();
        let mut tracks = Vec::new();
        for item in self.spotify.album_track(album, self.market.clone()) {
            if let Some(track) = into_track(item?) {
                tracks.push(track);
            }
        }

        if self.fetch_audio_features && !tracks.is_empty() {
            self.attach_audio_features(&mut tracks);
        }

        Ok(tracks)
    }
}
