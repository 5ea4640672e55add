//! Sync jobs: a single pass, or a pass every interval until shutdown

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::services::cache::SyncCache;
use crate::services::scanner::{PassSummary, PlanEntry, SyncEngine, SyncError};

/// JSON Lines file with one planned entry per file
pub const PLAN_FILE: &str = "scanly_plan.jsonl";
/// Pass counters of the planning run
pub const SUMMARY_FILE: &str = "summary.json";

/// Timing for the watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Delay between passes
    pub interval: Duration,
    /// Delay between checks while the source drive is missing
    pub mount_wait: Duration,
}

/// Run one pass and save the cache.
///
/// On a dry run nothing is saved; with `plan_dir` set the planned entries and
/// the pass summary are written there instead. An unavailable source is
/// logged and reported as `Ok(None)`.
pub async fn run_once(
    engine: &mut SyncEngine,
    cache: &mut SyncCache,
    plan_dir: Option<&Path>,
) -> Result<Option<PassSummary>> {
    let summary = match engine.run_pass(cache).await {
        Ok(summary) => summary,
        Err(e @ SyncError::SourceUnavailable { .. }) => {
            warn!(error = %e, "Source directory unavailable, nothing to sync");
            return Ok(None);
        }
    };

    if engine.is_dry_run() {
        let plan = engine.take_plan();
        if let Some(dir) = plan_dir {
            write_plan(dir, &plan, &summary).await?;
        }
    } else {
        cache.save().await?;
    }
    Ok(Some(summary))
}

/// Write `scanly_plan.jsonl` and `summary.json` into `dir`
pub async fn write_plan(dir: &Path, plan: &[PlanEntry], summary: &PassSummary) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create plan directory {}", dir.display()))?;

    let mut lines = String::new();
    for entry in plan {
        lines.push_str(&serde_json::to_string(entry).context("Failed to serialize plan entry")?);
        lines.push('\n');
    }
    let plan_path = dir.join(PLAN_FILE);
    tokio::fs::write(&plan_path, lines)
        .await
        .with_context(|| format!("Failed to write {}", plan_path.display()))?;

    let summary_path = dir.join(SUMMARY_FILE);
    let body = serde_json::to_vec_pretty(summary).context("Failed to serialize pass summary")?;
    tokio::fs::write(&summary_path, body)
        .await
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    info!(
        plan = %plan_path.display(),
        entries = plan.len(),
        "Plan written"
    );
    Ok(())
}

/// Sweep the source on a timer until `shutdown` flips to true.
///
/// While the source is missing the loop polls it on the shorter mount-wait
/// delay. The cache is saved after every pass and once more on the way out.
pub async fn run_forever(
    engine: &mut SyncEngine,
    cache: &mut SyncCache,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        source = %engine.source_dir().display(),
        interval_secs = schedule.interval.as_secs(),
        "Watching source directory"
    );

    let mut waiting_for_source = false;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match engine.run_pass(cache).await {
            Ok(_) => {
                if waiting_for_source {
                    info!(source = %engine.source_dir().display(), "Source directory is back");
                    waiting_for_source = false;
                }
                persist(cache).await;
                schedule.interval
            }
            Err(e @ SyncError::SourceUnavailable { .. }) => {
                if waiting_for_source {
                    debug!(error = %e, "Still waiting for source directory");
                } else {
                    warn!(error = %e, "Source directory unavailable, waiting for it to be mounted");
                    waiting_for_source = true;
                }
                schedule.mount_wait
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                // sender gone, treat it as a shutdown
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    persist(cache).await;
    info!("Watcher stopped");
}

async fn persist(cache: &mut SyncCache) {
    if let Err(e) = cache.save().await {
        warn!(path = %cache.path().display(), error = %e, "Failed to save sync cache");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::config::Config;
    use crate::services::filesystem::{LinkError, LinkOutcome, Linker};
    use crate::services::metadata::{LookupQuery, MetadataCandidate, MetadataSource};

    struct NoResults;

    #[async_trait]
    impl MetadataSource for NoResults {
        fn name(&self) -> &str {
            "none"
        }

        async fn search(&self, _query: &LookupQuery) -> anyhow::Result<Vec<MetadataCandidate>> {
            Ok(Vec::new())
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl Linker for AcceptAll {
        async fn link(&self, _source: &Path, _destination: &Path) -> Result<LinkOutcome, LinkError> {
            Ok(LinkOutcome::Created)
        }
    }

    fn engine_for(source: &Path, library: &Path) -> SyncEngine {
        let source = source.to_string_lossy().into_owned();
        let library = library.to_string_lossy().into_owned();
        let config = Config::from_lookup(move |key: &str| match key {
            "TMDB_API_KEY" => Some("test".to_string()),
            "SOURCE_DIR" => Some(source.clone()),
            "DESTINATION_DIRECTORY" => Some(library.clone()),
            _ => None,
        })
        .unwrap();
        SyncEngine::new(&config, Arc::new(NoResults), Arc::new(AcceptAll))
    }

    fn schedule() -> Schedule {
        Schedule {
            interval: Duration::from_millis(50),
            mount_wait: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_run_once_saves_cache() {
        let source = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        std::fs::write(source.path().join("Movie.2004.mkv"), b"x").unwrap();

        let cache_path = library.path().join("state/cache.json");
        let mut engine = engine_for(source.path(), library.path());
        let mut cache = SyncCache::new(&cache_path);

        let summary = run_once(&mut engine, &mut cache, None).await.unwrap().unwrap();
        assert_eq!(summary.linked, 1);
        assert_eq!(SyncCache::load(&cache_path).await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_with_missing_source() {
        let library = TempDir::new().unwrap();
        let mut engine = engine_for(&library.path().join("unmounted"), library.path());
        let mut cache = SyncCache::new(library.path().join("cache.json"));

        assert!(run_once(&mut engine, &mut cache, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dry_run_writes_plan_and_summary() {
        let source = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        std::fs::write(source.path().join("The.Matrix.1999.1080p.BluRay.x264-GROUP.mkv"), b"x").unwrap();
        std::fs::write(source.path().join("Show.Name.S02E05.720p.mkv"), b"x").unwrap();
        std::fs::write(source.path().join("notes.nfo"), b"x").unwrap();

        let cache_path = library.path().join("cache.json");
        let plan_dir = library.path().join("plan");
        let mut engine = engine_for(source.path(), library.path()).with_dry_run(true);
        let mut cache = SyncCache::new(&cache_path);

        let summary = run_once(&mut engine, &mut cache, Some(&plan_dir))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.planned, 2);
        assert!(!cache_path.exists());

        let lines = std::fs::read_to_string(plan_dir.join(PLAN_FILE)).unwrap();
        let entries: Vec<serde_json::Value> = lines
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        // sorted walk: "Show.Name..." before "The.Matrix..."
        assert_eq!(entries[0]["classification"]["kind"], "episode");
        assert_eq!(entries[0]["classification"]["season"], 2);
        assert_eq!(entries[1]["classification"]["kind"], "movie");
        assert_eq!(entries[1]["classification"]["title"], "The Matrix");
        assert_eq!(entries[1]["metadata"]["origin"], "fallback");
        assert_eq!(entries[1]["normalized"], "The Matrix 1999 GROUP");

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(plan_dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(written["planned"], 2);
        assert_eq!(written["filtered"], 1);
    }

    #[tokio::test]
    async fn test_run_forever_stops_on_shutdown_while_waiting_for_mount() {
        let library = TempDir::new().unwrap();
        let mut engine = engine_for(&library.path().join("unmounted"), library.path());
        let mut cache = SyncCache::new(library.path().join("cache.json"));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            run_forever(&mut engine, &mut cache, schedule(), rx).await;
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_forever_persists_after_each_pass() {
        let source = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        std::fs::write(source.path().join("Show.S01E01.mkv"), b"x").unwrap();

        let cache_path = library.path().join("cache.json");
        let mut engine = engine_for(source.path(), library.path());
        let mut cache = SyncCache::new(&cache_path);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            run_forever(&mut engine, &mut cache, schedule(), rx).await;
        });

        let mut saved = false;
        for _ in 0..100 {
            if cache_path.exists() {
                saved = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(saved);
        assert_eq!(SyncCache::load(&cache_path).await.len(), 1);
    }
}
