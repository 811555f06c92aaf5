use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{Release, ReleaseKind, Track};

/// Descriptive tag attached to a canonical track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    DeluxeEdition,
    Remaster,
    Anniversary,
    Vault,
    Bonus,
    SingleRelease,
    Compilation,
    AlternateVersion,
    Explicit,
    Clean,
    Acoustic,
    Live,
    OriginalRelease,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeluxeEdition => "deluxe_edition",
            Self::Remaster => "remaster",
            Self::Anniversary => "anniversary",
            Self::Vault => "vault",
            Self::Bonus => "bonus",
            Self::SingleRelease => "single_release",
            Self::Compilation => "compilation",
            Self::AlternateVersion => "alternate_version",
            Self::Explicit => "explicit",
            Self::Clean => "clean",
            Self::Acoustic => "acoustic",
            Self::Live => "live",
            Self::OriginalRelease => "original_release",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Lowercase substrings marking a re-recorded / alternate version of a catalog.
    pub alternate_version_markers: Vec<String>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            alternate_version_markers: vec![
                "taylor's version".to_string(),
                "taylor\u{2019}s version".to_string(),
                "taylors version".to_string(),
            ],
        }
    }
}

const SUBSTRING_TAGS: &[(&str, Tag)] = &[
    ("deluxe", Tag::DeluxeEdition),
    ("remaster", Tag::Remaster),
    ("anniversary", Tag::Anniversary),
    ("vault", Tag::Vault),
    ("bonus", Tag::Bonus),
];

static WORD_TAGS: LazyLock<Vec<(Regex, Tag)>> = LazyLock::new(|| {
    [
        ("explicit", Tag::Explicit),
        ("clean", Tag::Clean),
        ("acoustic", Tag::Acoustic),
        ("live", Tag::Live),
    ]
    .into_iter()
    .map(|(word, tag)| (Regex::new(&format!(r"\b{word}\b")).unwrap(), tag))
    .collect()
});

/// Tags a canonical track earns from the releases it was collected from.
///
/// Pure: the same `(track, sources)` always gives the same set.
pub fn generate_tags(_track: &Track, sources: &[&Release], config: &TagConfig) -> BTreeSet<Tag> {
    let mut tags = BTreeSet::new();

    for release in sources {
        let name = release.name.to_lowercase();

        for (needle, tag) in SUBSTRING_TAGS {
            if name.contains(needle) {
                tags.insert(*tag);
            }
        }

        match release.kind {
            ReleaseKind::Single => {
                tags.insert(Tag::SingleRelease);
            }
            ReleaseKind::Compilation => {
                tags.insert(Tag::Compilation);
            }
            ReleaseKind::StudioAlbum | ReleaseKind::AppearsOn => {}
        }

        if config
            .alternate_version_markers
            .iter()
            .any(|m| name.contains(&m.to_lowercase()))
        {
            tags.insert(Tag::AlternateVersion);
        }

        for (re, tag) in WORD_TAGS.iter() {
            if re.is_match(&name) {
                tags.insert(*tag);
            }
        }
    }

    if !tags.contains(&Tag::DeluxeEdition) {
        tags.insert(Tag::OriginalRelease);
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReleaseDate;

    fn track() -> Track {
        Track {
            id: "t1".into(),
            name: "Love Story".into(),
            duration_ms: 235_000,
            explicit: false,
            disc_number: 1,
            track_number: 3,
            audio_features: None,
        }
    }

    fn release(name: &str, kind: ReleaseKind) -> Release {
        Release {
            id: name.to_lowercase(),
            name: name.into(),
            kind,
            release_date: ReleaseDate::parse("2008-11-11"),
            track_count: 13,
            label: String::new(),
            genres: BTreeSet::new(),
            popularity: 0,
        }
    }

    fn tag_names(tags: &BTreeSet<Tag>) -> Vec<&'static str> {
        tags.iter().map(|t| t.as_str()).collect()
    }

    #[test]
    fn test_plain_album_is_original() {
        let r = release("Fearless", ReleaseKind::StudioAlbum);
        let tags = generate_tags(&track(), &[&r], &TagConfig::default());
        assert_eq!(tag_names(&tags), vec!["original_release"]);
    }

    #[test]
    fn test_anniversary_edition() {
        let r = release("Album (Anniversary Edition)", ReleaseKind::StudioAlbum);
        let tags = generate_tags(&track(), &[&r], &TagConfig::default());
        assert!(tags.contains(&Tag::Anniversary));
        // no deluxe_edition, so it still counts as an original release
        assert!(tags.contains(&Tag::OriginalRelease));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_deluxe_suppresses_original() {
        let r = release("Fearless (Platinum Deluxe Edition)", ReleaseKind::StudioAlbum);
        let tags = generate_tags(&track(), &[&r], &TagConfig::default());
        assert!(tags.contains(&Tag::DeluxeEdition));
        assert!(!tags.contains(&Tag::OriginalRelease));
    }

    #[test]
    fn test_tags_union_across_sources() {
        let album = release("Fearless", ReleaseKind::StudioAlbum);
        let single = release("Love Story (Acoustic)", ReleaseKind::Single);
        let comp = release("Greatest Hits - Remastered", ReleaseKind::Compilation);
        let tags = generate_tags(&track(), &[&album, &single, &comp], &TagConfig::default());
        assert_eq!(
            tag_names(&tags),
            vec!["remaster", "single_release", "compilation", "acoustic", "original_release"]
        );
    }

    #[test]
    fn test_alternate_version_markers() {
        let r = release("Fearless (Taylor's Version) [From The Vault]", ReleaseKind::StudioAlbum);
        let tags = generate_tags(&track(), &[&r], &TagConfig::default());
        assert!(tags.contains(&Tag::AlternateVersion));
        assert!(tags.contains(&Tag::Vault));

        let curly = release("Red (Taylor\u{2019}s Version)", ReleaseKind::StudioAlbum);
        let tags = generate_tags(&track(), &[&curly], &TagConfig::default());
        assert!(tags.contains(&Tag::AlternateVersion));

        let config = TagConfig {
            alternate_version_markers: vec!["re-recorded".into()],
        };
        let other = release("Hits (Re-Recorded)", ReleaseKind::Compilation);
        assert!(generate_tags(&track(), &[&other], &config).contains(&Tag::AlternateVersion));
    }

    #[test]
    fn test_word_tags_need_whole_words() {
        let live = release("Live at Wembley", ReleaseKind::StudioAlbum);
        assert!(generate_tags(&track(), &[&live], &TagConfig::default()).contains(&Tag::Live));

        let alive = release("Alive", ReleaseKind::StudioAlbum);
        assert!(!generate_tags(&track(), &[&alive], &TagConfig::default()).contains(&Tag::Live));

        let explicit = release("Yeezus (Explicit)", ReleaseKind::StudioAlbum);
        let clean = release("Yeezus (Clean)", ReleaseKind::StudioAlbum);
        let tags = generate_tags(&track(), &[&explicit, &clean], &TagConfig::default());
        assert!(tags.contains(&Tag::Explicit));
        assert!(tags.contains(&Tag::Clean));
    }

    #[test]
    fn test_bonus_and_appears_on() {
        let r = release("Soundtrack (Bonus Tracks)", ReleaseKind::AppearsOn);
        let tags = generate_tags(&track(), &[&r], &TagConfig::default());
        assert_eq!(tag_names(&tags), vec!["bonus", "original_release"]);
    }

    #[test]
    fn test_generation_is_idempotent() {
        let a = release("1989 (Deluxe)", ReleaseKind::StudioAlbum);
        let b = release("Style", ReleaseKind::Single);
        let config = TagConfig::default();
        let first = generate_tags(&track(), &[&a, &b], &config);
        let second = generate_tags(&track(), &[&a, &b], &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tag_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Tag::AlternateVersion).unwrap(),
            "\"alternate_version\""
        );
        assert_eq!(Tag::SingleRelease.to_string(), "single_release");
    }
}
