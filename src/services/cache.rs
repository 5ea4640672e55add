//! Persisted sync cache
//!
//! Maps each source path to the modification time it had when it was last
//! linked. Stored as a flat JSON object, `{"/src/a.mkv": 1700000000123456789}`.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Source path -> mtime (nanoseconds since the epoch)
#[derive(Debug, Clone)]
pub struct SyncCache {
    path: PathBuf,
    entries: BTreeMap<String, u64>,
    dirty: bool,
}

impl SyncCache {
    /// An empty cache that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the cache file. A missing or unreadable file gives an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(path);

        let raw = match tokio::fs::read(&cache.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %cache.path.display(), "No sync cache yet, starting empty");
                return cache;
            }
            Err(e) => {
                warn!(path = %cache.path.display(), error = %e, "Failed to read sync cache, starting empty");
                return cache;
            }
        };

        match serde_json::from_slice::<BTreeMap<String, u64>>(&raw) {
            Ok(entries) => {
                debug!(path = %cache.path.display(), entries = entries.len(), "Loaded sync cache");
                cache.entries = entries;
            }
            Err(e) => {
                warn!(path = %cache.path.display(), error = %e, "Sync cache is corrupt, starting empty");
            }
        }

        cache
    }

    pub fn get(&self, source: &Path) -> Option<u64> {
        self.entries.get(key(source)?).copied()
    }

    /// Record `mtime` for `source`. Paths that are not valid UTF-8 cannot be
    /// keyed and are left out.
    pub fn put(&mut self, source: &Path, mtime: u64) {
        let Some(key) = key(source) else {
            warn!(path = %source.display(), "Not caching path that is not valid UTF-8");
            return;
        };
        if self.entries.insert(key.to_string(), mtime) != Some(mtime) {
            self.dirty = true;
        }
    }

    /// Write the cache if anything changed since the last load/save.
    ///
    /// Goes through a sibling temp file and a rename so a crash mid-write
    /// leaves the previous cache intact.
    pub async fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache directory {}", parent.display()))?;
        }

        let body = serde_json::to_vec_pretty(&self.entries).context("Failed to serialize sync cache")?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Saved sync cache");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sync_cache.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn key(path: &Path) -> Option<&str> {
    path.to_str()
}

/// Modification time as nanoseconds since the epoch; 0 when unavailable.
pub fn mtime_stamp(meta: &Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
