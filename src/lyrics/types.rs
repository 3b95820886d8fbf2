use thiserror::Error;

/// One timestamped lyric line. `time` is in seconds from the start of the song.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricLine {
    pub time: f64,
    pub text: String,
}

/// Result of looking up which line is visible at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveLine {
    /// The track has no lines at all.
    NoLines,
    /// The query time precedes the first line.
    BeforeFirst,
    /// Index of the last line whose timestamp is <= the query time.
    At(usize),
}

/// Time-sorted lyric lines for one song.
///
/// An empty track is valid: it means the source text had no recognizable
/// timestamps and should be shown verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricTrack {
    lines: Vec<LyricLine>,
}

impl LyricTrack {
    /// Build a track from arbitrary lines. Sorting is stable so lines sharing
    /// a timestamp keep their original order.
    pub fn new(mut lines: Vec<LyricLine>) -> Self {
        lines.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { lines }
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    pub fn last(&self) -> Option<&LyricLine> {
        self.lines.last()
    }

    /// Find the line visible at time `t` with a binary search.
    pub fn active_index(&self, t: f64) -> ActiveLine {
        if self.lines.is_empty() {
            return ActiveLine::NoLines;
        }
        // Count of lines with time <= t; NaN compares as "not yet".
        let count = self.lines.partition_point(|line| line.time <= t);
        match count {
            0 => ActiveLine::BeforeFirst,
            n => ActiveLine::At(n - 1),
        }
    }
}

#[derive(Error, Debug)]
pub enum LyricsError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Lyrics lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> LyricTrack {
        LyricTrack::new(vec![
            LyricLine { time: 0.0, text: "a".into() },
            LyricLine { time: 2.0, text: "b".into() },
            LyricLine { time: 4.0, text: "c".into() },
        ])
    }

    #[test]
    fn lookup_with_lookahead_picks_upcoming_line() {
        let lookahead = 0.1;
        assert_eq!(track().active_index(1.95 + lookahead), ActiveLine::At(1));
        assert_eq!(track().active_index(-1.0 + lookahead), ActiveLine::BeforeFirst);
    }

    #[test]
    fn lookup_exact_boundaries() {
        let t = track();
        assert_eq!(t.active_index(0.0), ActiveLine::At(0));
        assert_eq!(t.active_index(1.999), ActiveLine::At(0));
        assert_eq!(t.active_index(2.0), ActiveLine::At(1));
        assert_eq!(t.active_index(100.0), ActiveLine::At(2));
    }

    #[test]
    fn lookup_on_empty_track() {
        assert_eq!(LyricTrack::default().active_index(3.0), ActiveLine::NoLines);
    }

    #[test]
    fn lookup_nan_is_before_first() {
        assert_eq!(track().active_index(f64::NAN), ActiveLine::BeforeFirst);
    }

    #[test]
    fn lookup_is_monotonic() {
        let t = LyricTrack::new(vec![
            LyricLine { time: 1.0, text: "x".into() },
            LyricLine { time: 1.0, text: "y".into() },
            LyricLine { time: 3.5, text: "z".into() },
            LyricLine { time: 7.25, text: "w".into() },
        ]);
        let rank = |a: ActiveLine| match a {
            ActiveLine::NoLines | ActiveLine::BeforeFirst => -1,
            ActiveLine::At(i) => i as i64,
        };
        let mut prev = rank(t.active_index(-5.0));
        let mut time = -5.0;
        while time < 10.0 {
            time += 0.05;
            let cur = rank(t.active_index(time));
            assert!(cur >= prev, "index went backwards at t={time}");
            prev = cur;
        }
    }

    #[test]
    fn sort_is_stable_for_equal_timestamps() {
        let t = LyricTrack::new(vec![
            LyricLine { time: 5.0, text: "late".into() },
            LyricLine { time: 1.0, text: "first".into() },
            LyricLine { time: 1.0, text: "second".into() },
        ]);
        let texts: Vec<_> = t.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "late"]);
        // Shared timestamp resolves to the last of the group.
        assert_eq!(t.active_index(1.0), ActiveLine::At(1));
    }
}
