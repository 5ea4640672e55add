//! Scanly keeps a Jellyfin-style library of symlinks in sync with an
//! unsorted download drive.

pub mod app_mode;
pub mod cli;
pub mod config;
pub mod jobs;
pub mod services;
