//! Sync pipeline services

pub mod cache;
pub mod filename_parser;
pub mod filesystem;
pub mod metadata;
pub mod normalizer;
pub mod organizer;
pub mod rate_limiter;
pub mod scanner;
pub mod text_utils;
pub mod tmdb;

pub use cache::SyncCache;
pub use filename_parser::{Classification, MediaKind, classify};
pub use filesystem::{LinkError, LinkOutcome, Linker, SymlinkLinker};
pub use metadata::{
    LookupQuery, MetadataCandidate, MetadataOrigin, MetadataResolver, MetadataSource, ResolvedMetadata,
};
pub use normalizer::NormalizeRules;
pub use organizer::{DestinationPath, LibraryRoots, destination_for};
pub use scanner::{FileOutcome, PassSummary, PlanEntry, SyncEngine, SyncError};
pub use tmdb::TmdbClient;
