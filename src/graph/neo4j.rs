//! Neo4j adapter over the HTTP transactional Cypher endpoint.
//!
//! Graph shape:
//!
//! ```text
//! (:Artist {spotify_id})-[:HAS_ERA]->(:Era {artist_id, name, ...})
//! (:Era)-[:CONTAINS {position, tags, source_releases, ...}]->(:Track {spotify_id, name, ...})
//! (:Track)-[:TAGGED_AS {artist_id, era}]->(:Tag {name})
//! ```
//!
//! `Track` nodes are shared between eras and artists, so everything derived
//! per era lives on the `CONTAINS` and `TAGGED_AS` relationships.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{GraphError, GraphWriter};
use crate::engagement::EngagementReport;
use crate::era::Era;
use crate::pipeline::{CanonicalTrack, EraPlan};

const RESET_TAG_LINKS: &str = "\
MATCH (:Track)-[link:TAGGED_AS {artist_id: $artist_id}]->(:Tag)
DELETE link";

const RESET_ERAS: &str = "\
MATCH (e:Era {artist_id: $artist_id})
DETACH DELETE e";

const WRITE_ERA: &str = "\
MERGE (a:Artist {spotify_id: $artist_id})
MERGE (e:Era {artist_id: $artist_id, name: $era.name})
SET e += $era
MERGE (a)-[:HAS_ERA]->(e)
WITH e
UNWIND $tracks AS t
MERGE (s:Track {spotify_id: t.id})
SET s.name = t.name,
    s.duration_ms = t.duration_ms,
    s.explicit = t.explicit
SET s += coalesce(t.audio_features, {})
MERGE (e)-[r:CONTAINS]->(s)
SET r.position = t.position,
    r.disc_number = t.disc_number,
    r.track_number = t.track_number,
    r.tags = t.tags,
    r.source_releases = t.source_releases";

const LINK_TAGS: &str = "\
UNWIND $tracks AS t
MATCH (s:Track {spotify_id: t.id})
UNWIND t.tags AS tag
MERGE (g:Tag {name: tag})
MERGE (s)-[:TAGGED_AS {artist_id: $artist_id, era: $era_name}]->(g)";

const WRITE_ENGAGEMENT: &str = "\
MERGE (a:Artist {spotify_id: $artist_id})
SET a.reddit_subreddit = $subreddit,
    a.reddit_subscribers = $subscribers,
    a.reddit_monthly_activity = $monthly_activity,
    a.reddit_engagement_score = $engagement_score,
    a.reddit_updated_at = datetime()";

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// HTTP endpoint, e.g. `http://localhost:7474` or an Aura `https://` URI.
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Statement {
    pub statement: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    errors: Vec<CypherError>,
}

#[derive(Debug, Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

pub fn reset_statements(artist_id: &str) -> Vec<Statement> {
    vec![
        Statement {
            statement: RESET_TAG_LINKS,
            parameters: json!({ "artist_id": artist_id }),
        },
        Statement {
            statement: RESET_ERAS,
            parameters: json!({ "artist_id": artist_id }),
        },
    ]
}

/// The two statements that store one era: nodes and `CONTAINS` rows, then tag links.
pub fn write_era_statements(
    artist_id: &str,
    era: &Era,
    tracks: &[CanonicalTrack],
) -> Vec<Statement> {
    let era_props = json!({
        "name": era.name,
        "start_date": era.start_date.map(|d| d.to_string()),
        "end_date": era.end_date.map(|d| d.to_string()),
        "primary_release_id": era.primary.id,
        "primary_release_name": era.primary.name,
        "primary_release_kind": era.primary.kind.as_str(),
        "primary_release_date": era.primary.release_date.map(|d| d.to_string()),
        "primary_label": era.primary.label,
        "primary_popularity": era.primary.popularity,
        "member_release_ids": era.members.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        "member_release_names": era.members.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        "track_count": tracks.len(),
    });

    let track_rows: Vec<Value> = tracks
        .iter()
        .enumerate()
        .map(|(position, c)| {
            json!({
                "id": c.track.id,
                "name": c.track.name,
                "duration_ms": c.track.duration_ms,
                "explicit": c.track.explicit,
                "disc_number": c.track.disc_number,
                "track_number": c.track.track_number,
                "position": position + 1,
                "tags": c.tags.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                "source_releases": c.source_releases,
                "audio_features": c.track.audio_features,
            })
        })
        .collect();

    let params = json!({
        "artist_id": artist_id,
        "era": era_props,
        "tracks": track_rows,
    });

    vec![
        Statement {
            statement: WRITE_ERA,
            parameters: params.clone(),
        },
        Statement {
            statement: LINK_TAGS,
            parameters: json!({
                "artist_id": artist_id,
                "era_name": era.name,
                "tracks": params["tracks"],
            }),
        },
    ]
}

/// Reset followed by every era, in the order they must run inside one transaction.
pub fn replace_statements(artist_id: &str, plans: &[EraPlan]) -> Vec<Statement> {
    let mut statements = reset_statements(artist_id);
    for plan in plans {
        statements.extend(write_era_statements(artist_id, &plan.era, &plan.tracks));
    }
    statements
}

pub fn engagement_statement(artist_id: &str, report: &EngagementReport) -> Statement {
    Statement {
        statement: WRITE_ENGAGEMENT,
        parameters: json!({
            "artist_id": artist_id,
            "subreddit": report.subreddit,
            "subscribers": report.subscribers,
            "monthly_activity": report.monthly_activity,
            "engagement_score": report.engagement_score,
        }),
    }
}

pub struct Neo4jWriter {
    endpoint: String,
    auth_header: String,
    agent: ureq::Agent,
}

impl Neo4jWriter {
    pub fn new(config: &Neo4jConfig) -> Self {
        let credentials = format!("{}:{}", config.user, config.password);
        let auth_header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        );
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            endpoint: commit_endpoint(&config.uri, &config.database),
            auth_header,
            agent,
        }
    }

    /// Run statements in one auto-committed transaction.
    fn commit(&self, statements: &[Statement]) -> Result<(), GraphError> {
        log::debug!("POST {} ({} statements)", self.endpoint, statements.len());
        let mut resp = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send_json(json!({ "statements": statements }))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(GraphError::Status(status));
        }

        let body: CommitResponse = resp.body_mut().read_json()?;
        match body.errors.into_iter().next() {
            Some(e) => Err(GraphError::Cypher {
                code: e.code,
                message: e.message,
            }),
            None => Ok(()),
        }
    }
}

impl GraphWriter for Neo4jWriter {
    fn replace_artist(&self, artist_id: &str, plans: &[EraPlan]) -> Result<(), GraphError> {
        log::info!(
            "Writing {} eras ({} tracks) for {artist_id}",
            plans.len(),
            plans.iter().map(|p| p.tracks.len()).sum::<usize>()
        );
        // One request: the endpoint rolls the whole transaction back on any error
        self.commit(&replace_statements(artist_id, plans))
    }

    fn write_engagement(
        &self,
        artist_id: &str,
        report: &EngagementReport,
    ) -> Result<(), GraphError> {
        self.commit(&[engagement_statement(artist_id, report)])
    }
}

fn commit_endpoint(uri: &str, database: &str) -> String {
    format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AudioFeatures, Release, ReleaseDate, ReleaseKind, Track};
    use crate::tags::Tag;

    fn era() -> Era {
        let primary = Release {
            id: "r1".into(),
            name: "Fearless".into(),
            kind: ReleaseKind::StudioAlbum,
            release_date: ReleaseDate::parse("2008-11-11"),
            track_count: 13,
            label: "Big Machine".into(),
            genres: Default::default(),
            popularity: 70,
        };
        Era {
            name: "fearless_2008_era".into(),
            members: vec![primary.clone()],
            primary,
            start_date: ReleaseDate::parse("2008-11-11"),
            end_date: ReleaseDate::parse("2008-11-11"),
        }
    }

    fn canonical(id: &str, features: Option<AudioFeatures>) -> CanonicalTrack {
        CanonicalTrack {
            track: Track {
                id: id.into(),
                name: "Love Story".into(),
                duration_ms: 235_000,
                explicit: false,
                disc_number: 1,
                track_number: 3,
                audio_features: features,
            },
            tags: [Tag::OriginalRelease, Tag::SingleRelease].into_iter().collect(),
            source_releases: vec!["r1".into(), "s1".into()],
        }
    }

    #[test]
    fn test_commit_endpoint() {
        assert_eq!(
            commit_endpoint("http://localhost:7474/", "neo4j"),
            "http://localhost:7474/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn test_era_statement_parameters() {
        let tracks = vec![canonical("t1", None), canonical("t2", Some(AudioFeatures::default()))];
        let stmts = write_era_statements("artist1", &era(), &tracks);
        assert_eq!(stmts.len(), 2);

        let p = &stmts[0].parameters;
        assert_eq!(p["artist_id"], "artist1");
        assert_eq!(p["era"]["name"], "fearless_2008_era");
        assert_eq!(p["era"]["primary_release_kind"], "studio_album");
        assert_eq!(p["era"]["start_date"], "2008-11-11");
        assert_eq!(p["era"]["track_count"], 2);
        assert_eq!(p["tracks"][0]["position"], 1);
        assert_eq!(p["tracks"][1]["position"], 2);
        assert_eq!(p["tracks"][0]["tags"], json!(["single_release", "original_release"]));
        assert_eq!(p["tracks"][0]["source_releases"], json!(["r1", "s1"]));
        assert!(p["tracks"][0]["audio_features"].is_null());
        assert_eq!(p["tracks"][1]["audio_features"]["key"], 0);

        // tag links are scoped to the artist and era
        let links = &stmts[1].parameters;
        assert_eq!(links["artist_id"], "artist1");
        assert_eq!(links["era_name"], "fearless_2008_era");
        assert_eq!(links["tracks"], p["tracks"]);
    }

    #[test]
    fn test_era_data_lives_on_relationships() {
        let stmts = write_era_statements("artist1", &era(), &[canonical("t1", None)]);
        let cypher = &stmts[0].statement;
        assert!(cypher.contains("r.tags = t.tags"));
        assert!(cypher.contains("r.source_releases = t.source_releases"));
        // the shared track node carries no per-era data
        assert!(!cypher.contains("s.tags"));
        assert!(!cypher.contains("s.source_releases"));
        assert!(stmts[1].statement.contains("era: $era_name"));
    }

    #[test]
    fn test_replace_is_one_statement_list() {
        let mut red = era();
        red.name = "red_2013_era".into();
        let plans = vec![
            EraPlan { era: era(), tracks: vec![canonical("t1", None)] },
            EraPlan { era: red, tracks: vec![canonical("t2", None)] },
        ];
        let stmts = replace_statements("artist1", &plans);

        // reset first, then era + tag links per era
        assert_eq!(stmts.len(), 2 + 2 * plans.len());
        assert_eq!(stmts[0].statement, RESET_TAG_LINKS);
        assert_eq!(stmts[1].statement, RESET_ERAS);
        assert_eq!(stmts[2].parameters["era"]["name"], "fearless_2008_era");
        assert_eq!(stmts[4].parameters["era"]["name"], "red_2013_era");
        assert!(stmts.iter().all(|s| s.parameters["artist_id"] == "artist1"));
    }

    #[test]
    fn test_replace_with_no_eras_only_resets() {
        let stmts = replace_statements("artist1", &[]);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_reset_targets_artist() {
        let stmts = reset_statements("artist1");
        assert_eq!(stmts.len(), 2);
        assert!(stmts.iter().all(|s| s.parameters["artist_id"] == "artist1"));
    }

    #[test]
    fn test_engagement_statement() {
        let report = EngagementReport {
            artist: "Taylor Swift".into(),
            subreddit: "TaylorSwift".into(),
            subscribers: 500_000,
            monthly_activity: 12_000,
            engagement_score: 24.0,
        };
        let s = engagement_statement("artist1", &report);
        assert_eq!(s.parameters["subreddit"], "TaylorSwift");
        assert_eq!(s.parameters["engagement_score"], 24.0);
    }

    #[test]
    fn test_commit_response_errors() {
        let ok: CommitResponse = serde_json::from_str(r#"{"results": [], "errors": []}"#).unwrap();
        assert!(ok.errors.is_empty());

        let err: CommitResponse = serde_json::from_str(
            r#"{"results": [], "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]}"#,
        )
        .unwrap();
        assert_eq!(err.errors[0].code, "Neo.ClientError.Statement.SyntaxError");
    }
}
