mod app;
mod ipc;
mod lyrics;
mod mpris;
mod scheduler;
mod timer;

use crate::app::App;
use crate::ipc::BroadcastServer;
use crate::lyrics::LrcDirectory;
use crate::mpris::MprisPlayer;
use crate::scheduler::{SchedulerHandle, SchedulerSettings};
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Application configuration from CLI
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Synced lyrics broadcaster for local display clients")]
pub struct Config {
    /// Unix socket display clients connect to. The lock file is `<path>.lock`.
    #[arg(long, env = "LYRICS_SOCKET_PATH", default_value = "/tmp/lyrics_app.sock")]
    socket_path: PathBuf,
    /// Plain-text mirror of the latest broadcast text
    #[arg(long, env = "LYRICS_MIRROR_PATH", default_value = "/tmp/lyrics")]
    mirror_path: PathBuf,
    /// Directory holding `<Artist - Title>.lrc` files
    /// (default: $XDG_CACHE_HOME/lyrics or ~/.cache/lyrics)
    #[arg(long, env = "LYRICS_CACHE_DIR")]
    lyrics_dir: Option<PathBuf>,
    /// Seconds between checks for a song change
    #[arg(long, default_value_t = 5)]
    check_interval: u64,
    /// Show each line this many milliseconds before its timestamp
    #[arg(long, default_value_t = 100)]
    lookahead_ms: u64,
    /// Deadline in seconds for finding a song's lyrics
    #[arg(long, default_value_t = 30)]
    fetch_timeout: u64,
    /// Blocklist for MPRIS player service names (comma-separated, case-insensitive)
    #[arg(
        long = "block",
        value_name = "SERVICE1,SERVICE2",
        value_delimiter = ','
    )]
    block: Vec<String>,
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(long)]
    pub debug_log: bool,
}

impl Config {
    fn lyrics_dir(&self) -> PathBuf {
        self.lyrics_dir.clone().unwrap_or_else(|| {
            default_lyrics_dir(
                std::env::var_os("XDG_CACHE_HOME").map(PathBuf::from),
                std::env::var_os("HOME").map(PathBuf::from),
            )
        })
    }

    fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            lookahead: self.lookahead_ms as f64 / 1000.0,
            ..SchedulerSettings::default()
        }
    }
}

fn default_lyrics_dir(xdg_cache: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    match (xdg_cache, home) {
        (Some(cache), _) if !cache.as_os_str().is_empty() => cache.join("lyrics"),
        (_, Some(home)) if !home.as_os_str().is_empty() => home.join(".cache").join("lyrics"),
        _ => PathBuf::from("lyrics_cache"),
    }
}

fn init_tracing(debug_log: bool) {
    let default = if debug_log { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn ensure_dir(dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(lyrics_dir = %dir.display(), error = %e, "Failed to create lyrics directory");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cfg = Config::parse();
    init_tracing(cfg.debug_log);

    // Lock before anything else so a second instance exits cleanly.
    let server = match BroadcastServer::start(&cfg.socket_path, Some(cfg.mirror_path.clone())).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start IPC server");
            return Err(e.into());
        }
    };

    let lyrics_dir = cfg.lyrics_dir();
    ensure_dir(&lyrics_dir);
    tracing::info!(lyrics_dir = %lyrics_dir.display(), "Lyrics directory");

    let player = Arc::new(MprisPlayer::new(cfg.block.clone()));
    let scheduler = SchedulerHandle::new(cfg.scheduler_settings(), player.clone(), server.clone());
    let app = App::new(
        player,
        Arc::new(LrcDirectory::new(lyrics_dir)),
        scheduler,
        server.clone(),
        Duration::from_secs(cfg.fetch_timeout),
    );

    let shutdown = CancellationToken::new();
    let app_task = tokio::spawn(app.run(
        Duration::from_secs(cfg.check_interval.max(1)),
        shutdown.clone(),
    ));

    shutdown_signal().await;
    tracing::info!("Shutting down");
    shutdown.cancel();
    if let Err(e) = app_task.await {
        tracing::error!(error = %e, "Player check loop panicked");
    }
    server.close().await;
    Ok(())
}
