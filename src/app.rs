// app.rs: Song watcher. Polls for the current song and hands new lyrics to the scheduler.

use crate::lyrics::{LyricsSource, lyrics_with_deadline};
use crate::mpris::{MprisError, MprisPlayer};
use crate::scheduler::{DisplayEvent, DisplaySink, SchedulerHandle};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const NO_MUSIC_TEXT: &str = "No music playing...";

/// Reports what is playing as `Artist - Title`.
#[async_trait]
pub trait SongDetector: Send + Sync {
    async fn current_song(&self) -> Result<Option<String>, MprisError>;
}

#[async_trait]
impl SongDetector for MprisPlayer {
    async fn current_song(&self) -> Result<Option<String>, MprisError> {
        MprisPlayer::current_song(self).await
    }
}

pub struct App {
    detector: Arc<dyn SongDetector>,
    lyrics: Arc<dyn LyricsSource>,
    scheduler: SchedulerHandle,
    sink: Arc<dyn DisplaySink>,
    fetch_timeout: Duration,
    current_song: Option<String>,
    idle_announced: bool,
}

impl App {
    pub fn new(
        detector: Arc<dyn SongDetector>,
        lyrics: Arc<dyn LyricsSource>,
        scheduler: SchedulerHandle,
        sink: Arc<dyn DisplaySink>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            detector,
            lyrics,
            scheduler,
            sink,
            fetch_timeout,
            current_song: None,
            idle_announced: false,
        }
    }

    /// Check for song changes every `interval` until `shutdown` fires, then
    /// stop the running session.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?interval, "Starting player check loop");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // A lookup may take up to the fetch timeout.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.update_song_info() => {}
                    }
                }
            }
        }
        if self.scheduler.is_active().await {
            self.scheduler.stop().await;
        }
        tracing::info!("Player check loop stopped");
    }

    pub async fn update_song_info(&mut self) {
        let song = match self.detector.current_song().await {
            Ok(Some(song)) => song,
            Ok(None) => return self.no_music().await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query current song");
                return self.no_music().await;
            }
        };
        if self.current_song.as_deref() == Some(song.as_str()) {
            return;
        }

        tracing::info!(song = %song, "New song detected");
        self.current_song = Some(song.clone());
        self.idle_announced = false;
        // Old lyrics must not keep scrolling while we look up the new ones.
        self.scheduler.stop().await;
        self.status(format!("... Searching for lyrics for {song} ...")).await;

        match lyrics_with_deadline(self.lyrics.as_ref(), &song, self.fetch_timeout).await {
            Ok(Some(text)) => self.scheduler.start_session(&text).await,
            Ok(None) => {
                tracing::info!(song = %song, "No lyrics found");
                self.status(format!("No lyrics found for {song}")).await;
            }
            Err(e) => {
                tracing::error!(song = %song, error = %e, "Failed to get lyrics");
                self.status(format!("Error getting lyrics: {e}")).await;
            }
        }
    }

    async fn no_music(&mut self) {
        self.current_song = None;
        if self.idle_announced {
            return;
        }
        self.idle_announced = true;
        self.scheduler.stop().await;
        self.status(NO_MUSIC_TEXT.to_string()).await;
    }

    async fn status(&self, text: String) {
        self.sink.display(DisplayEvent::Raw(text)).await;
    }
}
