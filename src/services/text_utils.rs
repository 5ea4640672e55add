//! Shared text normalization and comparison utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Year tokens the library accepts as release years
pub static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim whitespace and dangling separators, plus open brackets left at the end.
///
/// `"Movie ("` and `"- Show -"` both come out clean, while a balanced
/// `"Title (US)"` is left alone.
pub fn tidy_title(text: &str) -> String {
    let trimmed = text
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ',' | ':'))
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '-' | ',' | ':' | '(' | '[' | '{')
        });
    collapse_whitespace(trimmed)
}

/// Normalize a title for equality matching.
/// Lowercases, drops punctuation and normalizes whitespace.
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&stripped)
}

/// Parse the year out of a `YYYY-MM-DD` style date.
pub fn year_from_date(date: Option<&str>) -> Option<u32> {
    let date = date?.trim();
    let year = date.split('-').next()?;
    if year.len() != 4 {
        return None;
    }
    year.parse().ok()
}
