//! Minimal playback status and position querying for MPRIS.

use crate::mpris::connection::{MprisError, get_dbus_conn};
use zbus::Proxy;
use zvariant::OwnedValue;

const PLAYER_PATH: &str = "/org/mpris/MediaPlayer2";
const PLAYER_IFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Playback state reported by `PlaybackStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Playing" => PlaybackStatus::Playing,
            "Paused" => PlaybackStatus::Paused,
            _ => PlaybackStatus::Stopped,
        }
    }
}

fn parse_position_from_owned(val: &OwnedValue) -> Option<f64> {
    if let Ok(i) = std::convert::TryInto::<i64>::try_into(val.clone()) {
        return Some(i as f64 / 1_000_000.0);
    }
    if let Ok(u) = std::convert::TryInto::<u64>::try_into(val.clone()) {
        return Some(u as f64 / 1_000_000.0);
    }
    None
}

/// Fetch one `org.mpris.MediaPlayer2.Player` property with a targeted
/// `Properties.Get` (some players misbehave on `GetAll`).
pub(crate) async fn get_player_property(service: &str, name: &str) -> Result<Option<OwnedValue>, MprisError> {
    let conn = get_dbus_conn().await?;
    let props_proxy = Proxy::new(&conn, service, PLAYER_PATH, "org.freedesktop.DBus.Properties").await?;
    let reply = props_proxy.call_method("Get", &(PLAYER_IFACE, name)).await?;
    Ok(reply.body().deserialize::<OwnedValue>().ok())
}

/// Playback position in seconds; `0.0` when the player does not report one.
pub async fn get_position(service: &str) -> Result<f64, MprisError> {
    if service.is_empty() {
        return Ok(0.0);
    }
    let value = get_player_property(service, "Position").await?;
    Ok(value.as_ref().and_then(parse_position_from_owned).unwrap_or(0.0))
}

pub async fn get_playback_status(service: &str) -> Result<PlaybackStatus, MprisError> {
    if service.is_empty() {
        return Ok(PlaybackStatus::Stopped);
    }
    let value = get_player_property(service, "PlaybackStatus").await?;
    let status = value
        .and_then(|v| std::convert::TryInto::<String>::try_into(v).ok())
        .map(|s| PlaybackStatus::parse(&s))
        .unwrap_or_default();
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(PlaybackStatus::parse("Playing"), PlaybackStatus::Playing);
        assert_eq!(PlaybackStatus::parse("Paused"), PlaybackStatus::Paused);
        assert_eq!(PlaybackStatus::parse("Stopped"), PlaybackStatus::Stopped);
        assert_eq!(PlaybackStatus::parse(""), PlaybackStatus::Stopped);
    }
}
