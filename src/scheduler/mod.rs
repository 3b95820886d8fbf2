//! Lyric scheduling: one synchronizer session per song, plus the controller
//! that hands off between them.

pub mod handoff;
pub mod session;

pub use handoff::SchedulerHandle;
pub use session::Session;

use async_trait::async_trait;
use std::time::Duration;

pub const ABOUT_TO_START_TEXT: &str = "♪ Starting soon... ♪";
pub const SONG_ENDED_TEXT: &str = "♪ Song ended ♪";

/// What a display client should show next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    /// A synced lyric line became active.
    Line(String),
    /// Playback is before the first timed line.
    AboutToStart,
    /// The track ran past its last line; the session is done.
    SongEnded,
    /// Unsynced text shown verbatim.
    Raw(String),
}

impl DisplayEvent {
    pub fn text(&self) -> &str {
        match self {
            DisplayEvent::Line(text) | DisplayEvent::Raw(text) => text,
            DisplayEvent::AboutToStart => ABOUT_TO_START_TEXT,
            DisplayEvent::SongEnded => SONG_ENDED_TEXT,
        }
    }
}

#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn display(&self, event: DisplayEvent);
}

/// Current playback position in seconds. May be 0 or stale when unknown.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> f64;
}

/// Timing constants for the synchronizer and handoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    /// Added to the projected position before lookup.
    pub lookahead: f64,
    /// How far past the last line the song counts as finished.
    pub end_grace: f64,
    /// How often to compare the projection against the real player.
    pub resync_interval: Duration,
    /// Drift (seconds) beyond which the projection is rebased.
    pub drift_threshold: f64,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
    /// Wait after cancelling the previous session.
    pub handoff_grace: Duration,
    /// Emissions further than this from the line's timestamp are logged as late/early.
    pub timing_window: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            end_grace: 5.0,
            resync_interval: Duration::from_secs(5),
            drift_threshold: 0.5,
            min_sleep: Duration::from_millis(20),
            max_sleep: Duration::from_secs(1),
            handoff_grace: Duration::from_millis(50),
            timing_window: Duration::from_millis(100),
        }
    }
}
