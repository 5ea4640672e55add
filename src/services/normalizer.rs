//! Filename normalizer
//!
//! Turns scene-style release names into readable titles:
//! - "The.Matrix.1999.1080p.BluRay.x264-GROUP" -> "The Matrix 1999 GROUP"
//! - "Show_Name_S02E05_720p_WEB-DL" -> "Show Name S02E05"
//!
//! Year tokens and season/episode markers survive normalization; the
//! classifier needs them. A bracketed group holding one (`[S01E05]`,
//! `[2019]`) is unwrapped instead of dropped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::filename_parser::find_marker;
use super::text_utils::{YEAR_TOKEN, collapse_whitespace};

/// Bracketed release groups, `[SubGroup]`, `[1080p]`
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]").unwrap());

/// Upper bound on tag-removal rounds; each round only ever shortens the name
const MAX_TAG_ROUNDS: usize = 8;

/// Release tags removed from titles when no `RENAME_TAGS` pattern is configured.
///
/// Runs after separator replacement, so multi-part tags are written with
/// spaces ("web dl", "h 264", "ddp5 1").
pub static DEFAULT_RELEASE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:",
        // resolution and dynamic range
        r"2160p|1080p|1080i|720p|576p|480p|4k|uhd|hdr10\+?|hdr|sdr|dv|dovi|10 ?bit|8 ?bit|",
        // source
        r"remux|blu ?ray|bdremux|bdrip|brrip|web ?dl|webrip|hdrip|dvdrip|dvdscr|hdtv|",
        r"amzn|nf|dsnp|hmax|atvp|hulu|pcok|",
        // codecs
        r"x ?264|x ?265|h ?264|h ?265|hevc|avc|av1|xvid|divx|",
        // audio
        r"aac(?: ?2 0)?|e?ac3|ddp?(?: ?[257] [01])?|dd\+|dts(?: ?hd)?(?: ?ma)?|truehd|atmos|flac|",
        r"5 1|7 1|2 0|",
        // release flags and common groups
        r"proper|repack|extended|uncut|unrated|remastered|dual audio|subbed|dubbed|",
        r"rarbg|yify|yts|eztv|ettv|tgx",
        r")\b",
    ))
    .unwrap()
});

/// A single separator rewrite, e.g. `\.|_|-` => `" "`
#[derive(Debug, Clone)]
pub struct Replacement {
    pattern: Regex,
    replacement: String,
}

impl Replacement {
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }

    fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, regex::NoExpand(&self.replacement))
            .into_owned()
    }
}

/// Ordered normalization rules: separator rewrites first, then tag removal
#[derive(Debug, Clone)]
pub struct NormalizeRules {
    replacements: Vec<Replacement>,
    tags: Regex,
}

impl NormalizeRules {
    pub fn new(replacements: Vec<Replacement>, tags: Regex) -> Self {
        Self { replacements, tags }
    }

    /// Normalize a filename (without extension) into a clean title string.
    ///
    /// Never fails; a name made entirely of tags comes back empty.
    pub fn normalize(&self, raw: &str) -> String {
        let replaced = self
            .replacements
            .iter()
            .fold(raw.to_string(), |text, rule| rule.apply(&text));
        let mut text = collapse_whitespace(&strip_brackets(&replaced));

        // dropping a tag can join two words into a new one ("Web 720p DL")
        for _ in 0..MAX_TAG_ROUNDS {
            let next = collapse_whitespace(&self.tags.replace_all(&text, " "));
            if next == text {
                break;
            }
            text = next;
        }
        text
    }
}

/// Drop bracketed groups, keeping the contents of those that carry a year or
/// an episode marker.
fn strip_brackets(text: &str) -> String {
    BRACKETED
        .replace_all(text, |caps: &Captures<'_>| {
            let inner = &caps[1];
            if YEAR_TOKEN.is_match(inner) || find_marker(inner).is_some() {
                format!(" {} ", inner)
            } else {
                " ".to_string()
            }
        })
        .into_owned()
}

impl Default for NormalizeRules {
    fn default() -> Self {
        let separators = Regex::new(r"\.|_|-").unwrap();
        Self::new(
            vec![Replacement::new(separators, " ")],
            Regex::clone(&DEFAULT_RELEASE_TAGS),
        )
    }
}
