//! Destination path construction
//!
//! Library layout:
//! - Movies: `{movies}/Title (Year)/Title (Year).ext`
//! - Episodes: `{shows}/Title/Season 02/Title (S02E05) (Year).ext`
//!
//! The year segment is left out when no year is known. Output depends only
//! on the inputs; the sync cache and link replacement rely on that.

use std::path::{Path, PathBuf};

use super::filename_parser::{Classification, UNKNOWN_TITLE};
use super::metadata::ResolvedMetadata;

/// Destination roots for each media kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRoots {
    pub movies: PathBuf,
    pub shows: PathBuf,
}

/// Where a source file should be linked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPath {
    pub directory: PathBuf,
    pub file_name: String,
}

impl DestinationPath {
    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Build the destination for a classified, resolved file.
///
/// `extension` is the source extension without the dot, kept as found.
pub fn destination_for(
    roots: &LibraryRoots,
    classification: &Classification,
    metadata: &ResolvedMetadata,
    extension: Option<&str>,
) -> DestinationPath {
    let title = sanitize_for_filename(&metadata.title);
    let ext = extension
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    match classification {
        Classification::Movie { .. } => {
            let name = with_year(&title, metadata.year);
            DestinationPath {
                directory: roots.movies.join(&name),
                file_name: format!("{}{}", name, ext),
            }
        }
        Classification::Episode { season, episode, .. } => {
            let marker = format!("(S{:02}E{:02})", season, episode);
            DestinationPath {
                directory: roots.shows.join(&title).join(format!("Season {:02}", season)),
                file_name: format!("{}{}", with_year(&format!("{} {}", title, marker), metadata.year), ext),
            }
        }
    }
}

fn with_year(name: &str, year: Option<u32>) -> String {
    match year {
        Some(year) => format!("{} ({})", name, year),
        None => name.to_string(),
    }
}

/// Make a title safe to use as a single path component
pub fn sanitize_for_filename(name: &str) -> String {
    let sanitized = sanitize_filename::sanitize(name);
    let trimmed = sanitized
        .trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extension of a source path as found on disk, without the dot
pub fn source_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}
