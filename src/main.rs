//! Scanly - keeps a media library of symlinks in sync with a download drive
//!
//! Runs a single sweep (`--once`) or watches the source drive, sweeping
//! every `SCAN_INTERVAL_SECONDS`.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanly::app_mode::RunMode;
use scanly::cli::CliOptions;
use scanly::config::Config;
use scanly::jobs::{self, Schedule};
use scanly::services::{SymlinkLinker, SyncCache, SyncEngine, TmdbClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let options = CliOptions::from_args();
    init_tracing(options.verbose);

    let mut config = Config::from_env()?;
    if let Some(interval) = options.interval_override {
        config.scan_interval = interval;
    }
    config.ensure_directories()?;

    let run_mode = options.run_mode(RunMode::from_env());
    tracing::info!(
        run_mode = run_mode.as_str(),
        source = %config.source_dir.display(),
        movies = %config.movies_dir.display(),
        shows = %config.shows_dir.display(),
        dry_run = options.dry_run,
        "Starting Scanly"
    );

    let tmdb = TmdbClient::new(config.tmdb_api_key.clone(), config.lookup_timeout)
        .context("Failed to create TMDB client")?;
    let mut engine = SyncEngine::new(&config, Arc::new(tmdb), Arc::new(SymlinkLinker::new()))
        .with_dry_run(options.dry_run);
    let mut cache = SyncCache::load(&config.state_file).await;
    tracing::info!(path = %cache.path().display(), entries = cache.len(), "Sync cache loaded");

    match run_mode {
        RunMode::Once => {
            jobs::run_once(&mut engine, &mut cache, options.plan_dir.as_deref()).await?;
        }
        RunMode::Watch => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("Shutdown requested");
                        let _ = shutdown_tx.send(true);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                        // keep the sender alive so the watcher keeps running
                        std::future::pending::<()>().await;
                    }
                }
            });

            let schedule = Schedule {
                interval: config.scan_interval,
                mount_wait: config.mount_wait_interval(),
            };
            jobs::run_forever(&mut engine, &mut cache, schedule, shutdown_rx).await;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "scanly=debug" } else { "scanly=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
