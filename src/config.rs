use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::catalog::spotify::SpotifyConfig;
use crate::engagement::RedditConfig;
use crate::era::EraConfig;
use crate::graph::neo4j::Neo4jConfig;
use crate::pipeline::PipelineContext;
use crate::tags::TagConfig;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Spotify artist ids processed by `build` when none are given on the command line.
    pub artists: Vec<String>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    pub spotify: SpotifyConfig,
    pub neo4j: Neo4jConfig,
    pub era: EraConfig,
    pub tags: TagConfig,
    pub reddit: RedditConfig,
}

impl AppConfig {
    /// Load config from `~/.config/besties/config.toml`, then apply
    /// credential overrides from the environment.
    /// Returns default config if the file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Overwrite credentials with any non-empty value `lookup` returns.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 5] = [
            ("SPOTIFY_CLIENT_ID", &mut self.spotify.client_id),
            ("SPOTIFY_CLIENT_SECRET", &mut self.spotify.client_secret),
            ("NEO4J_URI", &mut self.neo4j.uri),
            ("NEO4J_USER", &mut self.neo4j.user),
            ("NEO4J_PASSWORD", &mut self.neo4j.password),
        ];
        for (key, field) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                log::debug!("{key} set from environment");
                *field = value;
            }
        }
    }

    pub fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            era: self.era.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("besties.db")
    } else {
        // Fallback: current directory
        PathBuf::from("besties.db")
    }
}
