//! Filename classifier for normalized release names
//!
//! Decides whether a normalized name is a movie or a TV episode:
//! - "Show Name S02E05" -> episode, season 2, episode 5
//! - "Some Show 1x01" -> episode, season 1, episode 1
//! - "Show Season 2 Episode 5" -> episode, season 2, episode 5
//! - "The Matrix 1999 GROUP" -> movie "The Matrix" (1999)
//!
//! Episode markers are tried in the order of [`MARKER_PATTERNS`]; the first
//! one that matches wins. Anything without a marker is a movie.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use super::text_utils::{YEAR_TOKEN, tidy_title};

/// Title used when nothing readable is left of a filename
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Media kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
        }
    }
}

/// Result of classifying a normalized filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Classification {
    Movie {
        title: String,
        year: Option<u32>,
    },
    Episode {
        title: String,
        season: u32,
        episode: u32,
        year: Option<u32>,
    },
}

impl Classification {
    pub fn kind(&self) -> MediaKind {
        match self {
            Classification::Movie { .. } => MediaKind::Movie,
            Classification::Episode { .. } => MediaKind::Episode,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Classification::Movie { title, .. } | Classification::Episode { title, .. } => title,
        }
    }

    pub fn year(&self) -> Option<u32> {
        match self {
            Classification::Movie { year, .. } | Classification::Episode { year, .. } => *year,
        }
    }
}

/// Family of season/episode markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerFamily {
    /// `S02E05`, `S002E005`, `S02 E05`
    SeasonEpisode,
    /// `1x01`
    Cross,
    /// `Season 2 E05`, `Season 2 Episode 5`
    SeasonContext,
}

/// A marker pattern and the handler that reads season/episode out of it
pub struct MarkerPattern {
    pub family: MarkerFamily,
    regex: Regex,
    extract: fn(&Captures<'_>) -> Option<(u32, u32)>,
}

/// Marker patterns in priority order
pub static MARKER_PATTERNS: Lazy<Vec<MarkerPattern>> = Lazy::new(|| {
    vec![
        MarkerPattern {
            family: MarkerFamily::SeasonEpisode,
            regex: Regex::new(r"(?i)\bs(?P<season>\d{1,3}) ?e(?P<episode>\d{1,3})").unwrap(),
            extract: season_episode,
        },
        MarkerPattern {
            family: MarkerFamily::Cross,
            regex: Regex::new(r"(?i)\b(?P<season>\d{1,2})x(?P<episode>\d{2,3})\b").unwrap(),
            extract: season_episode,
        },
        MarkerPattern {
            family: MarkerFamily::SeasonContext,
            regex: Regex::new(
                r"(?i)\bseason ?(?P<season>\d{1,3})\b.*?\b(?:e|ep|episode) ?(?P<episode>\d{1,3})\b",
            )
            .unwrap(),
            extract: season_episode,
        },
    ]
});

fn season_episode(caps: &Captures<'_>) -> Option<(u32, u32)> {
    let season = caps.name("season")?.as_str().parse().ok()?;
    let episode = caps.name("episode")?.as_str().parse().ok()?;
    Some((season, episode))
}

/// An episode marker located in a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub family: MarkerFamily,
    pub season: u32,
    pub episode: u32,
    pub start: usize,
    pub end: usize,
}

/// Find the first episode marker, trying families in priority order
pub fn find_marker(name: &str) -> Option<Marker> {
    MARKER_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.regex.captures(name)?;
        let (season, episode) = (pattern.extract)(&caps)?;
        let whole = caps.get(0)?;
        Some(Marker {
            family: pattern.family,
            season,
            episode,
            start: whole.start(),
            end: whole.end(),
        })
    })
}

/// Classify a normalized filename. Always succeeds with a best guess.
pub fn classify(name: &str) -> Classification {
    let classification = match find_marker(name) {
        Some(marker) => classify_episode(name, marker),
        None => classify_movie(name),
    };

    debug!(
        name = name,
        kind = classification.kind().as_str(),
        title = classification.title(),
        year = ?classification.year(),
        "Classified filename"
    );

    classification
}

fn classify_episode(name: &str, marker: Marker) -> Classification {
    let prefix = &name[..marker.start];
    let (title, title_year) = split_trailing_year(prefix);
    // only a trailing year is cut from the title; any other one stays in it
    let year = title_year
        .or_else(|| first_year(prefix))
        .or_else(|| first_year(&name[marker.end..]));

    Classification::Episode {
        title: or_unknown(title),
        season: marker.season,
        episode: marker.episode,
        year,
    }
}

fn classify_movie(name: &str) -> Classification {
    let (title, year) = split_last_year(name);
    Classification::Movie {
        title: or_unknown(title),
        year,
    }
}

/// Split at the last year token that has title text in front of it.
/// Everything after the year is release junk and gets dropped.
fn split_last_year(name: &str) -> (String, Option<u32>) {
    let split = YEAR_TOKEN
        .find_iter(name)
        .filter_map(|m| {
            let title = tidy_title(&name[..m.start()]);
            let year: u32 = m.as_str().parse().ok()?;
            (!title.is_empty()).then_some((title, year))
        })
        .last();

    match split {
        Some((title, year)) => (title, Some(year)),
        None => (tidy_title(name), None),
    }
}

/// Remove a year sitting at the very end of a show title ("Doctor Who 2005").
fn split_trailing_year(text: &str) -> (String, Option<u32>) {
    let tidy = tidy_title(text);
    let trailing = YEAR_TOKEN
        .find_iter(&tidy)
        .last()
        .filter(|m| tidy[m.end()..].trim_matches(|c: char| c == ')' || c.is_whitespace()).is_empty());

    if let Some(m) = trailing {
        let title = tidy_title(&tidy[..m.start()]);
        if !title.is_empty()
            && let Ok(year) = m.as_str().parse()
        {
            return (title, Some(year));
        }
    }

    (tidy, None)
}

fn first_year(text: &str) -> Option<u32> {
    YEAR_TOKEN.find_iter(text).find_map(|m| m.as_str().parse().ok())
}

fn or_unknown(title: String) -> String {
    if title.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_movie_with_year() {
        let result = classify("The Matrix 1999 GROUP");
        assert_eq!(
            result,
            Classification::Movie {
                title: "The Matrix".to_string(),
                year: Some(1999),
            }
        );
    }

    #[test]
    fn test_classify_movie_uses_last_year() {
        let result = classify("2001 A Space Odyssey 1968");
        assert_eq!(result.title(), "2001 A Space Odyssey");
        assert_eq!(result.year(), Some(1968));
    }

    #[test]
    fn test_classify_movie_year_only_title() {
        let result = classify("1917");
        assert_eq!(result.title(), "1917");
        assert_eq!(result.year(), None);

        let result = classify("1917 2019");
        assert_eq!(result.title(), "1917");
        assert_eq!(result.year(), Some(2019));
    }

    #[test]
    fn test_classify_movie_without_year() {
        let result = classify("Some Movie");
        assert_eq!(result.kind(), MediaKind::Movie);
        assert_eq!(result.title(), "Some Movie");
        assert_eq!(result.year(), None);
    }

    #[test]
    fn test_classify_movie_parenthesized_year() {
        let result = classify("Movie (2019)");
        assert_eq!(result.title(), "Movie");
        assert_eq!(result.year(), Some(2019));
    }

    #[test]
    fn test_parse_sxxexx() {
        let result = classify("Show Name S02E05");
        assert_eq!(
            result,
            Classification::Episode {
                title: "Show Name".to_string(),
                season: 2,
                episode: 5,
                year: None,
            }
        );
    }

    #[test]
    fn test_parse_long_sxxexx() {
        let result = classify("Daily Thing S001E120");
        assert_eq!(
            result,
            Classification::Episode {
                title: "Daily Thing".to_string(),
                season: 1,
                episode: 120,
                year: None,
            }
        );
    }

    #[test]
    fn test_parse_nxnn() {
        let result = classify("Some Show 1x01");
        assert_eq!(
            result,
            Classification::Episode {
                title: "Some Show".to_string(),
                season: 1,
                episode: 1,
                year: None,
            }
        );
    }

    #[test]
    fn test_parse_season_context() {
        let result = classify("Show Season 2 Episode 05");
        let Classification::Episode { title, season, episode, .. } = result else {
            panic!("expected an episode");
        };
        assert_eq!(title, "Show");
        assert_eq!(season, 2);
        assert_eq!(episode, 5);

        let marker = find_marker("Show Season 3 E07").unwrap();
        assert_eq!(marker.family, MarkerFamily::SeasonContext);
        assert_eq!((marker.season, marker.episode), (3, 7));
    }

    #[test]
    fn test_sxxexx_takes_priority() {
        let marker = find_marker("Show 1x02 S03E04").unwrap();
        assert_eq!(marker.family, MarkerFamily::SeasonEpisode);
        assert_eq!((marker.season, marker.episode), (3, 4));
    }

    #[test]
    fn test_episode_year_in_title() {
        let result = classify("Doctor Who 2005 S01E01");
        assert_eq!(result.title(), "Doctor Who");
        assert_eq!(result.year(), Some(2005));
    }

    #[test]
    fn test_episode_year_after_marker() {
        let result = classify("Show S01E01 2019");
        assert_eq!(result.title(), "Show");
        assert_eq!(result.year(), Some(2019));
    }

    #[test]
    fn test_episode_year_inside_title() {
        let result = classify("Show 1999 Edition S01E01");
        assert_eq!(
            result,
            Classification::Episode {
                title: "Show 1999 Edition".to_string(),
                season: 1,
                episode: 1,
                year: Some(1999),
            }
        );
    }

    #[test]
    fn test_bracketed_release_names() {
        let rules = crate::services::normalizer::NormalizeRules::default();

        let result = classify(&rules.normalize("Show.Name.[S01E05].720p"));
        assert_eq!(
            result,
            Classification::Episode {
                title: "Show Name".to_string(),
                season: 1,
                episode: 5,
                year: None,
            }
        );

        let result = classify(&rules.normalize("Movie.Title.[2019].1080p"));
        assert_eq!(
            result,
            Classification::Movie {
                title: "Movie Title".to_string(),
                year: Some(2019),
            }
        );
    }

    #[test]
    fn test_resolution_is_not_a_marker() {
        let result = classify("Movie 1920x1080");
        assert_eq!(result.kind(), MediaKind::Movie);
    }

    #[test]
    fn test_empty_title_is_unknown() {
        let result = classify("S01E01");
        assert_eq!(result.title(), UNKNOWN_TITLE);
        assert_eq!(result.kind(), MediaKind::Episode);

        let result = classify("");
        assert_eq!(result.title(), UNKNOWN_TITLE);
        assert_eq!(result.kind(), MediaKind::Movie);
    }
}
