//! Where raw lyric text comes from.
//!
//! Lookups are kept behind [`LyricsSource`] so the watcher does not care
//! whether text comes from disk or anything else.

use crate::lyrics::types::LyricsError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// Raw lyric text for `song` (`Artist - Title`), or `None` on a miss.
    async fn lyrics(&self, song: &str) -> Result<Option<String>, LyricsError>;
}

/// Run a lookup under a hard deadline.
pub async fn lyrics_with_deadline(
    source: &dyn LyricsSource,
    song: &str,
    deadline: Duration,
) -> Result<Option<String>, LyricsError> {
    match tokio::time::timeout(deadline, source.lyrics(song)).await {
        Ok(res) => res,
        Err(_) => Err(LyricsError::Timeout(deadline)),
    }
}

static UNSAFE_FILENAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap());

pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_FILENAME_RE.replace_all(name, "-").into_owned()
}

/// Reads `<dir>/<song>.lrc`, then `<dir>/<song>.txt`.
#[derive(Debug, Clone)]
pub struct LrcDirectory {
    dir: PathBuf,
}

impl LrcDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, song: &str) -> [PathBuf; 2] {
        let stem = sanitize_filename(song.trim());
        [
            self.dir.join(format!("{stem}.lrc")),
            self.dir.join(format!("{stem}.txt")),
        ]
    }
}

#[async_trait]
impl LyricsSource for LrcDirectory {
    async fn lyrics(&self, song: &str) -> Result<Option<String>, LyricsError> {
        for path in self.candidates(song) {
            match fs::read_to_string(&path).await {
                Ok(text) => {
                    tracing::debug!(path = %path.display(), "Found lyrics file");
                    return Ok(Some(text));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(LyricsError::Io {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }
        Ok(None)
    }
}
