//! Library link writer
//!
//! The sync engine never touches the destination tree directly; it goes
//! through a [`Linker`]. [`SymlinkLinker`] is the real one.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// What a successful link call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Nothing was at the destination
    Created,
    /// Something else was at the destination and got replaced
    Replaced,
    /// The destination already pointed at the source
    AlreadyLinked,
}

impl LinkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOutcome::Created => "created",
            LinkOutcome::Replaced => "replaced",
            LinkOutcome::AlreadyLinked => "already_linked",
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("permission denied writing {path}")]
    PermissionDenied { path: PathBuf },

    #[error("symlinks are not supported at {path}")]
    Unsupported { path: PathBuf },

    #[error("destination {path} is a directory")]
    DestinationIsDirectory { path: PathBuf },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LinkError {
    fn from_io(action: &'static str, path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => LinkError::PermissionDenied { path },
            io::ErrorKind::Unsupported => LinkError::Unsupported { path },
            _ => LinkError::Io { action, path, source },
        }
    }
}

/// Writes library entries pointing at source files
#[async_trait]
pub trait Linker: Send + Sync {
    /// Make `destination` point at `source`, creating parent directories and
    /// replacing whatever is already there.
    async fn link(&self, source: &Path, destination: &Path) -> Result<LinkOutcome, LinkError>;
}

/// Creates filesystem symlinks
#[derive(Debug, Default, Clone, Copy)]
pub struct SymlinkLinker;

impl SymlinkLinker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Linker for SymlinkLinker {
    async fn link(&self, source: &Path, destination: &Path) -> Result<LinkOutcome, LinkError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LinkError::from_io("create directory", parent, e))?;
        }

        let outcome = match tokio::fs::symlink_metadata(destination).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                let current = tokio::fs::read_link(destination)
                    .await
                    .map_err(|e| LinkError::from_io("read link", destination, e))?;
                if current == source {
                    return Ok(LinkOutcome::AlreadyLinked);
                }
                debug!(
                    destination = %destination.display(),
                    old_target = %current.display(),
                    "Replacing stale link"
                );
                remove(destination).await?;
                LinkOutcome::Replaced
            }
            Ok(meta) if meta.is_dir() => {
                return Err(LinkError::DestinationIsDirectory {
                    path: destination.to_path_buf(),
                });
            }
            Ok(_) => {
                debug!(destination = %destination.display(), "Replacing regular file with link");
                remove(destination).await?;
                LinkOutcome::Replaced
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => LinkOutcome::Created,
            Err(e) => return Err(LinkError::from_io("inspect", destination, e)),
        };

        create_symlink(source, destination)
            .await
            .map_err(|e| LinkError::from_io("create symlink", destination, e))?;

        Ok(outcome)
    }
}

async fn remove(path: &Path) -> Result<(), LinkError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|e| LinkError::from_io("remove", path, e))
}

#[cfg(unix)]
async fn create_symlink(source: &Path, destination: &Path) -> io::Result<()> {
    tokio::fs::symlink(source, destination).await
}

#[cfg(windows)]
async fn create_symlink(source: &Path, destination: &Path) -> io::Result<()> {
    tokio::fs::symlink_file(source, destination).await
}

#[cfg(not(any(unix, windows)))]
async fn create_symlink(_source: &Path, _destination: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not available"))
}
