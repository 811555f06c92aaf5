//! Era consolidation: partition an artist's discography into eras.
//!
//! Studio albums form the backbone. A new era starts before a studio album
//! when the year gap to the previous one is too large, the genres drift
//! apart, or the label changes. Everything else (singles, compilations,
//! guest appearances) is attached to the era nearest in time.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{Release, ReleaseDate};

/// Name of the single era produced when an artist has no studio albums.
pub const SINGLES_ERA: &str = "singles_era";

/// Edition words that cost a release the "original" bonus when picking a primary.
const EDITION_MARKERS: &[&str] = &["deluxe", "remaster", "reissue", "anniversary"];

/// Tunable thresholds for era boundary detection and primary scoring.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EraConfig {
    /// Start a new era when consecutive studio albums are more than this many years apart.
    pub max_year_gap: i32,
    /// Start a new era when genre overlap (|A ∩ B| / max(|A|, |B|)) drops below this.
    pub min_genre_overlap: f64,
    /// Start a new era when the record label changes.
    pub split_on_label_change: bool,
    /// Year the age bonus in primary-release scoring counts back from.
    pub reference_year: i32,
}

impl Default for EraConfig {
    fn default() -> Self {
        Self {
            max_year_gap: 3,
            min_genre_overlap: 0.3,
            split_on_label_change: true,
            reference_year: 2024,
        }
    }
}

/// A derived grouping of releases, represented in the graph by one canonical album.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Era {
    pub name: String,
    /// Members in ascending release-date order.
    pub members: Vec<Release>,
    pub primary: Release,
    pub start_date: Option<ReleaseDate>,
    pub end_date: Option<ReleaseDate>,
}

impl Era {
    pub fn member(&self, release_id: &str) -> Option<&Release> {
        self.members.iter().find(|r| r.id == release_id)
    }
}

/// Group a full discography into eras.
///
/// Never fails: missing dates, genres and labels all have defined fallbacks.
/// An empty discography yields no eras.
pub fn consolidate(releases: &[Release], config: &EraConfig) -> Vec<Era> {
    if releases.is_empty() {
        return Vec::new();
    }

    let sorted = sort_by_date(releases);
    let backbone: Vec<usize> = (0..sorted.len())
        .filter(|&i| sorted[i].is_studio_album())
        .collect();

    if backbone.is_empty() {
        log::debug!("No studio albums; using a single {SINGLES_ERA}");
        let members: Vec<&Release> = sorted.clone();
        let (start_date, end_date) = date_span(&members);
        let primary = select_primary(&members, config);
        return vec![Era {
            name: SINGLES_ERA.to_string(),
            primary: primary.clone(),
            members: members.into_iter().cloned().collect(),
            start_date,
            end_date,
        }];
    }

    // Walk the backbone, cutting a new group at every boundary
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (pos, &idx) in backbone.iter().enumerate() {
        let starts_era = pos == 0 || is_boundary(sorted[backbone[pos - 1]], sorted[idx], config);
        if starts_era {
            groups.push(vec![idx]);
        } else if let Some(group) = groups.last_mut() {
            group.push(idx);
        }
    }

    let spans: Vec<(Option<ReleaseDate>, Option<ReleaseDate>)> = groups
        .iter()
        .map(|g| date_span(&g.iter().map(|&i| sorted[i]).collect::<Vec<_>>()))
        .collect();

    for (idx, release) in sorted.iter().enumerate() {
        if release.is_studio_album() {
            continue;
        }
        let target = match release.release_date {
            Some(date) => nearest_era(&spans, &date),
            None => groups.len() - 1,
        };
        groups[target].push(idx);
    }

    groups
        .into_iter()
        .zip(spans)
        .map(|(mut group, (start_date, end_date))| {
            group.sort_unstable();
            let members: Vec<&Release> = group.iter().map(|&i| sorted[i]).collect();
            let primary = select_primary(&members, config).clone();
            Era {
                name: era_name(&primary),
                members: members.into_iter().cloned().collect(),
                primary,
                start_date,
                end_date,
            }
        })
        .collect()
}

/// Stable sort by calendar date; same-day releases and undated ones (after all
/// dated releases) keep their fetch order. Precision is not a tiebreak here,
/// so "2019" and "2019-01-01" stay as fetched.
fn sort_by_date(releases: &[Release]) -> Vec<&Release> {
    let mut sorted: Vec<&Release> = releases.iter().collect();
    sorted.sort_by_key(|r| (r.release_date.is_none(), r.release_date.map(|d| d.date())));
    sorted
}

/// Whether `current` opens a new era after `previous` (both studio albums).
fn is_boundary(previous: &Release, current: &Release, config: &EraConfig) -> bool {
    // Undated albums sort last and never force a boundary
    let (Some(prev_date), Some(cur_date)) = (previous.release_date, current.release_date) else {
        return false;
    };

    if cur_date.year() - prev_date.year() > config.max_year_gap {
        log::debug!(
            "Era boundary before '{}': {} years after '{}'",
            current.name,
            cur_date.year() - prev_date.year(),
            previous.name
        );
        return true;
    }

    if let Some(overlap) = genre_overlap(&previous.genres, &current.genres) {
        if overlap < config.min_genre_overlap {
            log::debug!(
                "Era boundary before '{}': genre overlap {overlap:.2}",
                current.name
            );
            return true;
        }
    }

    if config.split_on_label_change && labels_differ(&previous.label, &current.label) {
        log::debug!(
            "Era boundary before '{}': label '{}' -> '{}'",
            current.name,
            previous.label,
            current.label
        );
        return true;
    }

    false
}

/// `|A ∩ B| / max(|A|, |B|)` on lowercase genre names.
/// `None` when either side has no genres, since nothing can be compared.
pub fn genre_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let a: BTreeSet<String> = a.iter().map(|g| g.to_lowercase()).collect();
    let b: BTreeSet<String> = b.iter().map(|g| g.to_lowercase()).collect();
    let shared = a.intersection(&b).count();
    Some(shared as f64 / a.len().max(b.len()) as f64)
}

fn labels_differ(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && !b.is_empty() && a.to_lowercase() != b.to_lowercase()
}

fn date_span(members: &[&Release]) -> (Option<ReleaseDate>, Option<ReleaseDate>) {
    let dates = members.iter().filter_map(|r| r.release_date);
    let start = dates.clone().min();
    let end = dates.max();
    (start, end)
}

/// Distance in years from `date` to an era's range: 0 inside, else the gap
/// to the nearer boundary. Eras without a dated range are infinitely far.
fn distance_to_span(span: &(Option<ReleaseDate>, Option<ReleaseDate>), date: &ReleaseDate) -> f64 {
    match span {
        (Some(start), Some(end)) => {
            if date < start {
                date.years_until(start)
            } else if date > end {
                end.years_until(date)
            } else {
                0.0
            }
        }
        _ => f64::INFINITY,
    }
}

/// Index of the era closest in time; ties go to the earliest era.
fn nearest_era(spans: &[(Option<ReleaseDate>, Option<ReleaseDate>)], date: &ReleaseDate) -> usize {
    let mut best = spans.len() - 1;
    let mut best_distance = f64::INFINITY;
    for (i, span) in spans.iter().enumerate() {
        let d = distance_to_span(span, date);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Weighted preference for representing an era: studio albums, plain
/// (non-edition) names, older releases, longer track lists, popularity.
pub fn primary_score(release: &Release, config: &EraConfig) -> f64 {
    let mut score = 0.0;
    if release.is_studio_album() {
        score += 100.0;
    }
    let name = release.name.to_lowercase();
    if !EDITION_MARKERS.iter().any(|m| name.contains(m)) {
        score += 50.0;
    }
    if let Some(year) = release.year() {
        score += f64::from(config.reference_year.saturating_sub(year));
    }
    score += f64::from(release.track_count);
    score += 0.1 * f64::from(release.popularity);
    score
}

/// Highest-scoring member; the first one wins a tie.
fn select_primary<'a>(members: &[&'a Release], config: &EraConfig) -> &'a Release {
    let mut best = members[0];
    let mut best_score = primary_score(best, config);
    for &candidate in &members[1..] {
        let score = primary_score(candidate, config);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W").unwrap());

/// Lowercase and replace every non-word character with `_`.
pub fn slug(name: &str) -> String {
    NON_WORD_RE
        .replace_all(&name.to_lowercase(), "_")
        .into_owned()
}

/// `<slug of primary name>_<year>_era`
pub fn era_name(primary: &Release) -> String {
    let year = primary
        .year()
        .map(|y| y.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}_{}_era", slug(&primary.name), year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReleaseKind;

    fn release(id: &str, name: &str, kind: ReleaseKind, date: Option<&str>) -> Release {
        Release {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            release_date: date.and_then(ReleaseDate::parse),
            track_count: 10,
            label: "Big Machine".to_string(),
            genres: ["pop".to_string()].into_iter().collect(),
            popularity: 50,
        }
    }

    fn studio(id: &str, date: &str) -> Release {
        release(id, &format!("Album {id}"), ReleaseKind::StudioAlbum, Some(date))
    }

    fn member_ids(era: &Era) -> Vec<&str> {
        era.members.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_empty_discography_has_no_eras() {
        assert!(consolidate(&[], &EraConfig::default()).is_empty());
    }

    #[test]
    fn test_year_gap_boundary() {
        let releases = vec![
            studio("a", "2006-10-24"),
            studio("b", "2008-11-11"),
            studio("c", "2012-10-22"),
            studio("d", "2013-06-01"),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(eras.len(), 2);
        assert_eq!(member_ids(&eras[0]), vec!["a", "b"]);
        assert_eq!(member_ids(&eras[1]), vec!["c", "d"]);
    }

    #[test]
    fn test_gap_of_exactly_max_is_not_a_boundary() {
        let releases = vec![studio("a", "2010"), studio("b", "2013")];
        assert_eq!(consolidate(&releases, &EraConfig::default()).len(), 1);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let releases = vec![
            studio("d", "2013-06-01"),
            studio("b", "2008-11-11"),
            studio("a", "2006-10-24"),
            studio("c", "2012-10-22"),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(member_ids(&eras[0]), vec!["a", "b"]);
        assert_eq!(member_ids(&eras[1]), vec!["c", "d"]);
    }

    #[test]
    fn test_genre_drift_boundary() {
        let mut country = studio("a", "2006");
        country.genres = ["country".into(), "pop".into(), "folk".into(), "americana".into()]
            .into_iter()
            .collect();
        let mut pop = studio("b", "2007");
        pop.genres = ["pop".into(), "synthpop".into(), "dance pop".into(), "electropop".into()]
            .into_iter()
            .collect();
        // overlap = 1 / 4 = 0.25 < 0.3
        let eras = consolidate(&[country, pop], &EraConfig::default());
        assert_eq!(eras.len(), 2);
    }

    #[test]
    fn test_genre_overlap_skipped_when_one_side_empty() {
        let a = studio("a", "2006");
        let mut b = studio("b", "2007");
        b.genres.clear();
        assert_eq!(consolidate(&[a, b], &EraConfig::default()).len(), 1);
    }

    #[test]
    fn test_genre_overlap_ratio() {
        let a: BTreeSet<String> = ["Rock".into(), "indie".into()].into_iter().collect();
        let b: BTreeSet<String> = ["rock".into(), "indie".into(), "art rock".into()]
            .into_iter()
            .collect();
        let overlap = genre_overlap(&a, &b).unwrap();
        assert!((overlap - 2.0 / 3.0).abs() < 1e-9);
        assert!(genre_overlap(&a, &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_label_change_boundary() {
        let a = studio("a", "2017");
        let mut b = studio("b", "2019");
        b.label = "Republic Records".into();
        let eras = consolidate(&[a.clone(), b.clone()], &EraConfig::default());
        assert_eq!(eras.len(), 2);

        let config = EraConfig {
            split_on_label_change: false,
            ..EraConfig::default()
        };
        assert_eq!(consolidate(&[a, b], &config).len(), 1);
    }

    #[test]
    fn test_label_comparison_is_case_insensitive_and_skips_empty() {
        let a = studio("a", "2017");
        let mut b = studio("b", "2018");
        b.label = "BIG MACHINE".into();
        let mut c = studio("c", "2019");
        c.label = String::new();
        assert_eq!(consolidate(&[a, b, c], &EraConfig::default()).len(), 1);
    }

    #[test]
    fn test_empty_backbone_single_era() {
        let releases = vec![
            release("s1", "Song One", ReleaseKind::Single, Some("2015-03-01")),
            release("s2", "Song Two", ReleaseKind::Single, Some("2016-07-01")),
            release("c1", "Hits", ReleaseKind::Compilation, None),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(eras.len(), 1);
        assert_eq!(eras[0].name, SINGLES_ERA);
        assert_eq!(eras[0].members.len(), 3);
        assert_eq!(eras[0].start_date.unwrap().to_string(), "2015-03-01");
        assert_eq!(eras[0].end_date.unwrap().to_string(), "2016-07-01");
    }

    #[test]
    fn test_non_backbone_assigned_to_nearest_era() {
        let releases = vec![
            studio("a", "2006-06-01"),
            studio("b", "2008-06-01"),
            studio("c", "2014-06-01"),
            // inside era 0
            release("s1", "Single 1", ReleaseKind::Single, Some("2007-03-01")),
            // one year after era 0, five years before era 1
            release("s2", "Single 2", ReleaseKind::Single, Some("2009-06-01")),
            // closer to era 1
            release("s3", "Single 3", ReleaseKind::Single, Some("2013-01-01")),
            // after everything
            release("x1", "Feature", ReleaseKind::AppearsOn, Some("2020-01-01")),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(eras.len(), 2);
        assert_eq!(member_ids(&eras[0]), vec!["a", "s1", "b", "s2"]);
        assert_eq!(member_ids(&eras[1]), vec!["s3", "c", "x1"]);
    }

    #[test]
    fn test_equidistant_release_goes_to_earliest_era() {
        let releases = vec![
            studio("a", "2001-01-01"),
            studio("b", "2011-01-01"),
            release("s", "Midpoint", ReleaseKind::Single, Some("2006-01-01")),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(eras.len(), 2);
        // 1826 days on either side
        assert!(eras[0].member("s").is_some());
    }

    #[test]
    fn test_undated_releases_append_without_boundary() {
        let releases = vec![
            release("u", "Lost Album", ReleaseKind::StudioAlbum, None),
            studio("a", "2001"),
            studio("b", "2010"),
            release("us", "Lost Single", ReleaseKind::Single, None),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(eras.len(), 2);
        assert_eq!(member_ids(&eras[0]), vec!["a"]);
        assert_eq!(member_ids(&eras[1]), vec!["b", "u", "us"]);
        assert_eq!(eras[1].start_date.unwrap().year(), 2010);
    }

    #[test]
    fn test_all_undated_studio_albums_form_one_era() {
        let releases = vec![
            release("a", "First", ReleaseKind::StudioAlbum, None),
            release("b", "Second", ReleaseKind::StudioAlbum, None),
            release("s", "Single", ReleaseKind::Single, Some("2001")),
        ];
        let eras = consolidate(&releases, &EraConfig::default());
        assert_eq!(eras.len(), 1);
        assert_eq!(eras[0].name, "first_unknown_era");
        assert!(eras[0].start_date.is_none());
    }

    #[test]
    fn test_primary_prefers_plain_edition() {
        let mut plain = release("p", "Album", ReleaseKind::StudioAlbum, Some("2020"));
        plain.track_count = 10;
        plain.popularity = 60;
        let mut deluxe = release("d", "Album (Deluxe)", ReleaseKind::StudioAlbum, Some("2020"));
        deluxe.track_count = 14;
        deluxe.popularity = 70;

        let config = EraConfig::default();
        // 100 + 50 + 4 + 10 + 6 = 170 vs 100 + 0 + 4 + 14 + 7 = 125
        assert!((primary_score(&plain, &config) - 170.0).abs() < 1e-9);
        assert!((primary_score(&deluxe, &config) - 125.0).abs() < 1e-9);

        let eras = consolidate(&[deluxe, plain], &config);
        assert_eq!(eras.len(), 1);
        assert_eq!(eras[0].primary.id, "p");
        assert_eq!(eras[0].name, "album_2020_era");
    }

    #[test]
    fn test_primary_tie_goes_to_first_member() {
        let a = release("a", "Twin", ReleaseKind::StudioAlbum, Some("2020-01-01"));
        let b = release("b", "Twin", ReleaseKind::StudioAlbum, Some("2020-02-01"));
        let eras = consolidate(&[b, a], &EraConfig::default());
        assert_eq!(eras[0].primary.id, "a");
    }

    #[test]
    fn test_same_day_releases_keep_fetch_order() {
        let full = studio("full", "2019-01-01");
        let year_only = studio("year_only", "2019");
        let eras = consolidate(&[full.clone(), year_only.clone()], &EraConfig::default());
        assert_eq!(member_ids(&eras[0]), vec!["full", "year_only"]);

        let eras = consolidate(&[year_only, full], &EraConfig::default());
        assert_eq!(member_ids(&eras[0]), vec!["year_only", "full"]);
    }

    #[test]
    fn test_primary_score_extreme_reference_year() {
        let r = studio("a", "2020-01-01");
        for reference_year in [i32::MIN, i32::MAX] {
            let config = EraConfig { reference_year, ..EraConfig::default() };
            assert!(primary_score(&r, &config).is_finite());
        }
    }

    #[test]
    fn test_primary_score_undated_has_no_age_bonus() {
        let mut r = release("u", "Unknown", ReleaseKind::Single, None);
        r.track_count = 1;
        r.popularity = 0;
        assert!((primary_score(&r, &EraConfig::default()) - 51.0).abs() < 1e-9);
    }

    #[test]
    fn test_adding_release_inside_era_keeps_count() {
        let base = vec![
            studio("a", "2006"),
            studio("b", "2008"),
            studio("c", "2012"),
            studio("d", "2013"),
        ];
        let config = EraConfig::default();
        let before = consolidate(&base, &config).len();

        let mut with_single = base.clone();
        with_single.push(release("s", "Single", ReleaseKind::Single, Some("2007-05-01")));
        assert_eq!(consolidate(&with_single, &config).len(), before);

        let mut with_album = base;
        with_album.push(studio("e", "2007"));
        assert_eq!(consolidate(&with_album, &config).len(), before);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Red (Taylor's Version)"), "red__taylor_s_version_");
        assert_eq!(slug("1989"), "1989");
        assert_eq!(slug("808s & Heartbreak"), "808s___heartbreak");
    }

    #[test]
    fn test_era_name_uses_primary_year() {
        let r = release("r", "Fearless", ReleaseKind::StudioAlbum, Some("2008-11-11"));
        assert_eq!(era_name(&r), "fearless_2008_era");
    }
}
