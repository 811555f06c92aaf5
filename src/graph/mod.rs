pub mod neo4j;

use thiserror::Error;

use crate::engagement::EngagementReport;
use crate::pipeline::EraPlan;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("Graph store returned HTTP {0}")]
    Status(u16),
    #[error("Cypher error {code}: {message}")]
    Cypher { code: String, message: String },
}

/// Sink for derived artist state.
///
/// Upsert semantics belong to the implementation. `replace_artist` must be
/// all-or-nothing: on error the artist's previously written eras are intact.
pub trait GraphWriter {
    /// Drop an artist's previously derived eras and write `plans` in their place.
    fn replace_artist(&self, artist_id: &str, plans: &[EraPlan]) -> Result<(), GraphError>;

    /// Attach community-engagement figures to an artist.
    fn write_engagement(
        &self,
        artist_id: &str,
        report: &EngagementReport,
    ) -> Result<(), GraphError>;
}
