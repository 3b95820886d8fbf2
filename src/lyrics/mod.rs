// lyrics/mod.rs - LRC parsing, lookup, and lyric text sources
pub mod parse;
pub mod source;
pub mod types;

pub use parse::parse_lrc;
pub use source::{LrcDirectory, LyricsSource, lyrics_with_deadline};
pub use types::{ActiveLine, LyricTrack};
