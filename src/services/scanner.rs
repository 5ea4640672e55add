//! Sync engine
//!
//! One pass walks the source drive and, for every allowed file that is new
//! or changed since the last pass, works out its library location and links
//! it there:
//!
//! normalize -> classify -> resolve metadata -> build path -> link -> cache
//!
//! Files are handled one at a time. The cache entry is written only after
//! the link succeeds, so a failed link is retried on the next pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::cache::{SyncCache, mtime_stamp};
use super::filename_parser::{Classification, classify};
use super::filesystem::{LinkOutcome, Linker};
use super::metadata::{MetadataResolver, MetadataSource, ResolvedMetadata};
use super::normalizer::NormalizeRules;
use super::organizer::{LibraryRoots, destination_for, source_extension};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The source root is missing or not a directory (e.g. an unmounted drive)
    #[error("source directory {path} is unavailable: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
}

/// What happened to a single source file during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Extension not in the allowed set
    Filtered,
    /// Same mtime as the cache entry
    Unchanged,
    /// Disappeared between listing and stat
    Vanished,
    /// Dry run: would have been linked here
    Planned { destination: PathBuf },
    Linked {
        destination: PathBuf,
        outcome: LinkOutcome,
    },
    Failed {
        destination: Option<PathBuf>,
        error: String,
    },
}

/// Everything a dry run decided about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub normalized: String,
    pub classification: Classification,
    pub metadata: ResolvedMetadata,
    pub destination: PathBuf,
}

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub discovered: usize,
    pub filtered: usize,
    pub unchanged: usize,
    pub vanished: usize,
    pub linked: usize,
    pub already_linked: usize,
    pub planned: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        self.discovered += 1;
        match outcome {
            FileOutcome::Filtered => self.filtered += 1,
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Vanished => self.vanished += 1,
            FileOutcome::Planned { .. } => self.planned += 1,
            FileOutcome::Linked {
                outcome: LinkOutcome::AlreadyLinked,
                ..
            } => self.already_linked += 1,
            FileOutcome::Linked { .. } => self.linked += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Drives sync passes over the source drive
pub struct SyncEngine {
    config: Config,
    roots: LibraryRoots,
    rules: NormalizeRules,
    resolver: MetadataResolver,
    linker: Arc<dyn Linker>,
    dry_run: bool,
    plan: Vec<PlanEntry>,
}

impl SyncEngine {
    pub fn new(config: &Config, source: Arc<dyn MetadataSource>, linker: Arc<dyn Linker>) -> Self {
        Self {
            roots: LibraryRoots {
                movies: config.movies_dir.clone(),
                shows: config.shows_dir.clone(),
            },
            rules: config.normalize_rules(),
            resolver: MetadataResolver::new(source, config.lookup_timeout),
            linker,
            dry_run: false,
            plan: Vec::new(),
            config: config.clone(),
        }
    }

    /// Plan links without writing links or cache entries
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Planned entries from the last dry-run pass
    pub fn take_plan(&mut self) -> Vec<PlanEntry> {
        std::mem::take(&mut self.plan)
    }

    pub fn source_dir(&self) -> &Path {
        &self.config.source_dir
    }

    /// Run one full pass over the source drive
    pub async fn run_pass(&mut self, cache: &mut SyncCache) -> Result<PassSummary, SyncError> {
        let source_root = self.source_root().await?;
        self.resolver.begin_pass();
        self.plan.clear();

        info!(
            source = %source_root.display(),
            cached = cache.len(),
            dry_run = self.dry_run,
            "Starting sync pass"
        );

        let mut summary = PassSummary::default();
        for path in discover_files(&source_root) {
            let outcome = self.process_file(&path, cache).await;
            summary.record(&outcome);
        }

        info!(
            discovered = summary.discovered,
            linked = summary.linked,
            already_linked = summary.already_linked,
            unchanged = summary.unchanged,
            filtered = summary.filtered,
            planned = summary.planned,
            failed = summary.failed,
            "Sync pass complete"
        );

        Ok(summary)
    }

    /// Absolute source root, checked to be an existing directory
    async fn source_root(&self) -> Result<PathBuf, SyncError> {
        let unavailable = |reason: String| SyncError::SourceUnavailable {
            path: self.config.source_dir.clone(),
            reason,
        };

        let root = std::path::absolute(&self.config.source_dir).map_err(|e| unavailable(e.to_string()))?;
        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !meta.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }
        Ok(root)
    }

    /// Take one source file through the pipeline
    pub async fn process_file(&mut self, path: &Path, cache: &mut SyncCache) -> FileOutcome {
        if !self.config.is_supported(path) {
            debug!(path = %path.display(), "Skipping unsupported extension");
            return FileOutcome::Filtered;
        }

        // cache keys are UTF-8 strings
        if path.to_str().is_none() {
            warn!(path = %path.display(), "Skipping path that is not valid UTF-8");
            return FileOutcome::Failed {
                destination: None,
                error: "path is not valid UTF-8".to_string(),
            };
        }

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "File vanished before it could be processed");
                return FileOutcome::Vanished;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read file metadata");
                return FileOutcome::Failed {
                    destination: None,
                    error: e.to_string(),
                };
            }
        };
        let mtime = mtime_stamp(&meta);

        if cache.get(path) == Some(mtime) {
            debug!(path = %path.display(), "Unchanged since last pass");
            return FileOutcome::Unchanged;
        }

        let entry = self.plan_file(path).await;

        if self.dry_run {
            info!(
                source = %path.display(),
                destination = %entry.destination.display(),
                kind = entry.classification.kind().as_str(),
                "Dry run: would link"
            );
            let destination = entry.destination.clone();
            self.plan.push(entry);
            return FileOutcome::Planned { destination };
        }
        let destination = entry.destination;

        match self.linker.link(path, &destination).await {
            Ok(outcome) => {
                cache.put(path, mtime);
                match outcome {
                    LinkOutcome::AlreadyLinked => debug!(
                        source = %path.display(),
                        destination = %destination.display(),
                        "Link already in place"
                    ),
                    _ => info!(
                        source = %path.display(),
                        destination = %destination.display(),
                        outcome = outcome.as_str(),
                        "Linked"
                    ),
                }
                FileOutcome::Linked { destination, outcome }
            }
            Err(e) => {
                warn!(
                    source = %path.display(),
                    destination = %destination.display(),
                    error = %e,
                    "Failed to link, will retry next pass"
                );
                FileOutcome::Failed {
                    destination: Some(destination),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn plan_file(&mut self, path: &Path) -> PlanEntry {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalized = self.rules.normalize(&stem);
        let classification = classify(&normalized);
        let metadata = self.resolver.resolve(&classification).await;
        let destination =
            destination_for(&self.roots, &classification, &metadata, source_extension(path)).full_path();

        PlanEntry {
            source: path.to_path_buf(),
            normalized,
            classification,
            metadata,
            destination,
        }
    }
}

/// Regular files under `root`, in a stable order. Symlinks are not followed.
fn discover_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
