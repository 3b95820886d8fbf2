use crate::lyrics::types::{LyricLine, LyricTrack};
use once_cell::sync::Lazy;
use regex::Regex;

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,3}):(\d{2})(?:\.(\d{1,3}))?\]").unwrap());

/// Parse an LRC blob into a time-sorted track.
///
/// Every `[mm:ss]` / `[mm:ss.f]` tag on a line produces its own entry sharing
/// the text left after stripping the tags. Lines without tags (including ID
/// tags like `[ar:...]`) are skipped. Never fails; an empty track means the
/// blob should be shown as-is.
pub fn parse_lrc(raw: &str) -> LyricTrack {
    let re = &TIMESTAMP_RE;
    let mut lines = Vec::new();
    for line in raw.lines() {
        let stamps: Vec<u64> = re
            .captures_iter(line)
            .filter_map(|cap| {
                let min = cap.get(1)?.as_str().parse::<u64>().ok()?;
                let sec = cap.get(2)?.as_str().parse::<u64>().ok()?;
                let ms = cap.get(3).map(|f| fraction_to_millis(f.as_str())).unwrap_or(0);
                Some(min * 60_000 + sec * 1000 + ms)
            })
            .collect();
        if stamps.is_empty() {
            continue;
        }
        let text = re.replace_all(line, "").trim().to_string();
        for millis in stamps {
            lines.push(LyricLine {
                time: millis as f64 / 1000.0,
                text: text.clone(),
            });
        }
    }
    LyricTrack::new(lines)
}

/// `.1` is 100ms, `.49` is 490ms, `.490` is 490ms.
fn fraction_to_millis(digits: &str) -> u64 {
    let value = digits.parse::<u64>().unwrap_or(0);
    match digits.len() {
        1 => value * 100,
        2 => value * 10,
        _ => value,
    }
}
