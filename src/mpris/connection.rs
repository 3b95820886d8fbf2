//! D-Bus connection management and player discovery for MPRIS.

use std::sync::Arc;
use tokio::sync::OnceCell;
use zbus::proxy;

pub const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const PLAYERCTLD_SERVICE: &str = "org.mpris.MediaPlayer2.playerctld";

/// Errors that can occur during MPRIS operations
#[derive(thiserror::Error, Debug)]
pub enum MprisError {
    #[error("D-Bus error: {0}")]
    ZBus(#[from] zbus::Error),
    #[error("D-Bus call failed: {0}")]
    Fdo(#[from] zbus::fdo::Error),
    #[error("Failed to establish D-Bus connection")]
    NoConnection,
}

/// Global D-Bus connection singleton
static DBUS_CONNECTION: OnceCell<Arc<zbus::Connection>> = OnceCell::const_new();

/// Get or create a shared D-Bus session connection
pub async fn get_dbus_conn() -> Result<Arc<zbus::Connection>, MprisError> {
    DBUS_CONNECTION
        .get_or_try_init(|| async {
            let conn = zbus::Connection::session()
                .await
                .map_err(|_| MprisError::NoConnection)?;
            Ok(Arc::new(conn))
        })
        .await
        .cloned()
}

/// playerctld keeps its players ordered by most recent activity.
#[proxy(
    interface = "com.github.altdesktop.playerctld",
    default_service = "org.mpris.MediaPlayer2.playerctld",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait Playerctld {
    #[zbus(property)]
    fn player_names(&self) -> zbus::Result<Vec<String>>;
}

/// MPRIS player services on the session bus, most relevant first.
///
/// Uses playerctld's ordering when it runs, otherwise the bus name list.
pub async fn get_active_player_names() -> Result<Vec<String>, MprisError> {
    let conn = get_dbus_conn().await?;

    if let Ok(proxy) = PlayerctldProxy::new(&conn).await
        && let Ok(names) = proxy.player_names().await
        && !names.is_empty()
    {
        return Ok(names);
    }

    let dbus = zbus::fdo::DBusProxy::new(&conn).await?;
    let names = dbus
        .list_names()
        .await?
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| is_player_service(name))
        .collect();
    Ok(names)
}

pub fn is_player_service(name: &str) -> bool {
    name.starts_with(MPRIS_PREFIX) && name != PLAYERCTLD_SERVICE
}

/// Check if a player service name should be blocked
///
/// Returns true if the service name (case-insensitive) contains any blocked string.
pub fn is_blocked(service: &str, block_list: &[String]) -> bool {
    let service_lower = service.to_lowercase();
    block_list
        .iter()
        .any(|blocked| service_lower.contains(&blocked.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_list_is_case_insensitive_substring() {
        let block = vec!["Firefox".to_string(), "chromium".to_string()];
        assert!(is_blocked("org.mpris.MediaPlayer2.firefox.instance123", &block));
        assert!(is_blocked("org.mpris.MediaPlayer2.Chromium", &block));
        assert!(!is_blocked("org.mpris.MediaPlayer2.mpd", &block));
        assert!(!is_blocked("org.mpris.MediaPlayer2.mpd", &[]));
    }

    #[test]
    fn player_service_filter() {
        assert!(is_player_service("org.mpris.MediaPlayer2.spotify"));
        assert!(!is_player_service("org.mpris.MediaPlayer2.playerctld"));
        assert!(!is_player_service("org.freedesktop.Notifications"));
    }
}
