//! Application configuration management

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::{Regex, RegexBuilder};

use crate::services::normalizer::{DEFAULT_RELEASE_TAGS, NormalizeRules, Replacement};

const DEFAULT_EXTENSIONS: &str = ".mp4,.mkv,.srt,.avi,.mov,.divx,.m4v,.ts,.wmv";
const DEFAULT_REPLACEMENTS: &str = r#"\.|_|- => " ""#;
const DEFAULT_STATE_FILE: &str = "data/processed_files.json";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// TMDB API key
    pub tmdb_api_key: String,

    /// Unsorted download drive that gets scanned
    pub source_dir: PathBuf,

    /// Root of the movie library
    pub movies_dir: PathBuf,

    /// Root of the TV library
    pub shows_dir: PathBuf,

    /// Lowercase extensions including the leading dot
    pub allowed_extensions: Vec<String>,

    /// Seconds between sweeps in watch mode
    pub scan_interval: Duration,

    /// Upper bound for a single metadata lookup
    pub lookup_timeout: Duration,

    /// Release-tag pattern removed from titles
    pub rename_tags: Option<Regex>,

    /// Separator rewrites applied before tag removal
    pub rename_replacements: Vec<Replacement>,

    /// Sync cache location
    pub state_file: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let tmdb_api_key =
            var("TMDB_API_KEY").context("TMDB_API_KEY must be set in the environment or .env file")?;

        let source_dir = var("SOURCE_DIR")
            .map(PathBuf::from)
            .context("SOURCE_DIR must be provided in the environment")?;

        let (movies_dir, shows_dir) = match (var("DESTINATION_MOVIES"), var("DESTINATION_SHOWS")) {
            (Some(movies), Some(shows)) => (PathBuf::from(movies), PathBuf::from(shows)),
            _ => {
                let base = var("DESTINATION_DIRECTORY").map(PathBuf::from).context(
                    "DESTINATION_MOVIES/DESTINATION_SHOWS or DESTINATION_DIRECTORY must be configured",
                )?;
                let movie_folder = var("CUSTOM_MOVIE_FOLDER").unwrap_or_else(|| "Movies".to_string());
                let show_folder = var("CUSTOM_SHOW_FOLDER").unwrap_or_else(|| "Shows".to_string());
                (base.join(movie_folder), base.join(show_folder))
            }
        };

        let scan_interval = var("SCAN_INTERVAL_SECONDS")
            .or_else(|| var("MONITOR_SCAN_INTERVAL"))
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .context("Invalid SCAN_INTERVAL_SECONDS")?;
        if scan_interval == 0 {
            bail!("SCAN_INTERVAL_SECONDS must be greater than zero");
        }

        let lookup_timeout = var("TMDB_TIMEOUT_SECONDS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u64>()
            .context("Invalid TMDB_TIMEOUT_SECONDS")?;

        let allowed_extensions =
            parse_extensions(&var("ALLOWED_EXTENSIONS").unwrap_or_else(|| DEFAULT_EXTENSIONS.to_string()));
        if allowed_extensions.is_empty() {
            bail!("ALLOWED_EXTENSIONS must list at least one extension");
        }

        let rename_tags = var("RENAME_TAGS")
            .map(|raw| {
                RegexBuilder::new(&raw)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid RENAME_TAGS pattern: {}", raw))
            })
            .transpose()?;

        let rename_replacements = parse_replacements(
            &var("RENAME_REPLACEMENTS").unwrap_or_else(|| DEFAULT_REPLACEMENTS.to_string()),
        )?;

        let state_file = var("STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

        Ok(Self {
            tmdb_api_key,
            source_dir,
            movies_dir,
            shows_dir,
            allowed_extensions,
            scan_interval: Duration::from_secs(scan_interval),
            lookup_timeout: Duration::from_secs(lookup_timeout.max(1)),
            rename_tags,
            rename_replacements,
            state_file,
        })
    }

    /// Create destination roots and the cache file's parent directory
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.movies_dir, &self.shows_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        if let Some(parent) = self.state_file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(())
    }

    /// Whether the file's extension is in the allowed set (case-insensitive)
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Normalization rules built from the rename settings
    pub fn normalize_rules(&self) -> NormalizeRules {
        let tags = self
            .rename_tags
            .clone()
            .unwrap_or_else(|| Regex::clone(&DEFAULT_RELEASE_TAGS));
        NormalizeRules::new(self.rename_replacements.clone(), tags)
    }

    /// Delay between checks while the source root is missing
    pub fn mount_wait_interval(&self) -> Duration {
        let interval = self.scan_interval.as_secs();
        Duration::from_secs((interval / 3).max(5).min(interval))
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| if ext.starts_with('.') { ext } else { format!(".{}", ext) })
        .collect()
}

/// Parse `pattern => replacement` rules separated by `;`
fn parse_replacements(raw: &str) -> Result<Vec<Replacement>> {
    let mut rules = Vec::new();
    for chunk in raw.split(';') {
        let Some((pattern, replacement)) = chunk.split_once("=>") else {
            continue;
        };
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        let replacement = replacement.trim().trim_matches('"').trim_matches('\'');
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid RENAME_REPLACEMENTS pattern: {}", pattern))?;
        rules.push(Replacement::new(regex, replacement));
    }
    Ok(rules)
}
