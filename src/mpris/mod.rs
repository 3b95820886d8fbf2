//! MPRIS module: song detection and playback position over D-Bus.

pub mod connection;
pub mod metadata;
pub mod playback;

pub use connection::{MprisError, is_blocked};
pub use playback::PlaybackStatus;

use crate::scheduler::PositionSource;
use async_trait::async_trait;

/// The active MPRIS player, resolved on every query so player switches are
/// picked up without restarting.
#[derive(Debug, Clone, Default)]
pub struct MprisPlayer {
    block_list: Vec<String>,
}

impl MprisPlayer {
    pub fn new(block_list: Vec<String>) -> Self {
        Self { block_list }
    }

    /// First non-blocked player, preferring one that is playing.
    pub async fn active_service(&self) -> Result<Option<String>, MprisError> {
        let candidates: Vec<String> = connection::get_active_player_names()
            .await?
            .into_iter()
            .filter(|s| !is_blocked(s, &self.block_list))
            .collect();
        for service in &candidates {
            if playback::get_playback_status(service).await? == PlaybackStatus::Playing {
                return Ok(Some(service.clone()));
            }
        }
        Ok(candidates.into_iter().next())
    }

    /// `Artist - Title` of the current track, or `None` if nothing is
    /// playing or paused.
    pub async fn current_song(&self) -> Result<Option<String>, MprisError> {
        let Some(service) = self.active_service().await? else {
            return Ok(None);
        };
        if playback::get_playback_status(&service).await? == PlaybackStatus::Stopped {
            return Ok(None);
        }
        let meta = metadata::get_metadata(&service).await?;
        tracing::debug!(service = %service, title = %meta.title, artist = %meta.artist, "Current track");
        Ok(meta.song_id())
    }
}

#[async_trait]
impl PositionSource for MprisPlayer {
    async fn current_position(&self) -> f64 {
        let service = match self.active_service().await {
            Ok(Some(service)) => service,
            Ok(None) => return 0.0,
            Err(e) => {
                tracing::warn!(error = %e, "D-Bus error finding player");
                return 0.0;
            }
        };
        match playback::get_position(&service).await {
            Ok(pos) => {
                tracing::debug!(service = %service, seconds = pos, "Player position");
                pos
            }
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "D-Bus error getting position");
                0.0
            }
        }
    }
}
