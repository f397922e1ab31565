//! trackcheck — compare local track durations with the catalog.
//!
//! Reads a JSON array of local track records, looks each one up, and
//! reports files whose duration differs from the matched catalog track.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use trackcheck::{
    CatalogClient, ClientCredentialsAuth, Config, FileStorage, LocalTrack, Secrets,
    TrackComparator, Trackcheck, TrackcheckError,
};

/// Trackcheck CLI
#[derive(Parser)]
#[command(name = "trackcheck")]
#[command(version)]
#[command(about = "Compare local track durations with a music catalog")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "TRACKCHECK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare a JSON array of local tracks against the catalog
    Compare {
        /// File with `[{"file_name", "title", "artist", "album", "duration_ms"}, ...]`
        tracks: PathBuf,
        /// Use cached data only, never contact the catalog
        #[arg(long)]
        cache_only: bool,
        /// Print the full summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or maintain the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts and approximate size
    Stats,
    /// Remove all cached data
    Clear,
    /// Remove expired entries
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Cache { action } => {
            let client = build_client(&config, None)?;
            match action {
                CacheAction::Stats => {
                    let stats = client.cache_stats();
                    println!("enabled:  {}", stats.enabled);
                    println!("searches: {}", stats.search_count);
                    println!("tracks:   {}", stats.track_count);
                    println!("size:     ~{} KiB", stats.approx_size_bytes / 1024);
                }
                CacheAction::Clear => {
                    client.clear_cache();
                    println!("cache cleared");
                }
                CacheAction::Cleanup => {
                    let removed = client.cleanup_cache();
                    client.flush_cache();
                    println!(
                        "removed {} searches, {} tracks",
                        removed.searches_removed, removed.tracks_removed
                    );
                }
            }
        }

        Command::Compare {
            tracks,
            cache_only,
            json,
        } => {
            let content = std::fs::read_to_string(&tracks)?;
            let local: Vec<LocalTrack> = serde_json::from_str::<Vec<LocalTrack>>(&content)?
                .into_iter()
                .map(|t| LocalTrack::new(t.file_name, t.title, t.artist, t.album, t.duration_ms))
                .collect();

            let auth = if cache_only {
                None
            } else {
                let (id, secret) = Secrets::load()?.client_credentials().ok_or_else(|| {
                    TrackcheckError::Configuration(
                        "no catalog credentials (secrets.toml or TRACKCHECK_CLIENT_ID/SECRET); use --cache-only".into(),
                    )
                })?;
                Some(Arc::new(
                    ClientCredentialsAuth::new(id, secret).with_token_url(&config.api.token_url),
                ))
            };

            let client = build_client(&config, auth.clone())?;
            if let Some(auth) = &auth {
                auth.authenticate(client.fetcher()).await?;
            }
            let client = Arc::new(client);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping after the current track");
                    on_signal.cancel();
                }
            });

            let comparator = TrackComparator::new(client.clone())
                .length_tolerance_ms(config.matching.length_tolerance_ms)
                .warning_tolerance_ms(config.matching.warning_tolerance_ms)
                .cache_only(cache_only);
            let outcome = comparator.compare_all(&local, &cancel).await;
            client.flush_cache();
            let summary = outcome?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for row in &summary.results {
                    let remote = row
                        .remote_duration_ms
                        .map(trackcheck::types::format_duration)
                        .unwrap_or_else(|| "N/A".to_string());
                    println!(
                        "{:<10} {}  local {}  catalog {}",
                        row.status.as_str(),
                        row.file_name,
                        trackcheck::types::format_duration(row.local_duration_ms),
                        remote
                    );
                    if let Some(reason) = row.not_found_reason.as_ref().or(row.details.as_ref()) {
                        println!("           {reason}");
                    }
                }
                println!(
                    "\n{} files, {} with issues{}",
                    summary.results.len(),
                    summary.issues,
                    if summary.cancelled { " (cancelled)" } else { "" }
                );
            }
            info!(files = summary.results.len(), issues = summary.issues, "comparison finished");
        }
    }

    Ok(())
}

/// Build a [`CatalogClient`] backed by on-disk cache storage.
fn build_client(
    config: &Config,
    auth: Option<Arc<ClientCredentialsAuth>>,
) -> Result<CatalogClient, TrackcheckError> {
    let storage = match &config.cache.dir {
        Some(dir) => FileStorage::new(dir),
        None => FileStorage::default_location()?,
    };

    let mut builder = Trackcheck::builder()
        .config(config)
        .storage(Arc::new(storage));
    if let Some(auth) = auth {
        builder = builder.auth(auth);
    }
    builder.build()
}
