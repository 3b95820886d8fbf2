//! Minimal track metadata struct and metadata querying for MPRIS.

use crate::mpris::connection::MprisError;
use crate::mpris::playback::get_player_property;
use std::collections::HashMap;
use zvariant::OwnedValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
}

impl TrackMetadata {
    /// `Artist - Title`, or just the title when the artist is unknown.
    /// `None` when there is no title to look lyrics up by.
    pub fn song_id(&self) -> Option<String> {
        let title = self.title.trim();
        let artist = self.artist.trim();
        match (artist.is_empty(), title.is_empty()) {
            (_, true) => None,
            (true, false) => Some(title.to_string()),
            (false, false) => Some(format!("{artist} - {title}")),
        }
    }
}

fn string_field(map: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| std::convert::TryInto::<String>::try_into(v.clone()).ok())
}

/// MPRIS defines artist/album as string arrays, but some players send
/// a single string.
fn first_string(map: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    let value = map.get(key)?;
    if let Ok(list) = std::convert::TryInto::<Vec<String>>::try_into(value.clone()) {
        return list.into_iter().next();
    }
    std::convert::TryInto::<String>::try_into(value.clone()).ok()
}

/// Extract metadata fields from a D-Bus property map.
pub fn extract_metadata(map: &HashMap<String, OwnedValue>) -> TrackMetadata {
    TrackMetadata {
        title: string_field(map, "xesam:title").unwrap_or_default(),
        artist: first_string(map, "xesam:artist").unwrap_or_default(),
    }
}

/// Query metadata for a specific MPRIS player service.
pub async fn get_metadata(service: &str) -> Result<TrackMetadata, MprisError> {
    if service.is_empty() {
        return Ok(TrackMetadata::default());
    }
    let Some(value) = get_player_property(service, "Metadata").await? else {
        return Ok(TrackMetadata::default());
    };
    match std::convert::TryInto::<HashMap<String, OwnedValue>>::try_into(value) {
        Ok(map) => Ok(extract_metadata(&map)),
        Err(_) => Ok(TrackMetadata::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(artist: &str, title: &str) -> TrackMetadata {
        TrackMetadata {
            title: title.to_string(),
            artist: artist.to_string(),
        }
    }

    #[test]
    fn song_id_formats_artist_and_title() {
        assert_eq!(meta("Queen", "Bohemian Rhapsody").song_id().as_deref(), Some("Queen - Bohemian Rhapsody"));
        assert_eq!(meta("", "Untitled").song_id().as_deref(), Some("Untitled"));
        assert_eq!(meta("Queen", "  ").song_id(), None);
        assert_eq!(TrackMetadata::default().song_id(), None);
    }

    #[test]
    fn empty_map_yields_default() {
        assert_eq!(extract_metadata(&HashMap::new()), TrackMetadata::default());
    }
}
