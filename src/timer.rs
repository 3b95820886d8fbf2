use tokio::time::Instant;

/// Projects playback position from one observed sample so the scheduler does
/// not have to ask the player on every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTimer {
    /// Position in seconds observed at `anchor_instant`.
    anchor_position: f64,
    anchor_instant: Instant,
}

impl PlaybackTimer {
    pub fn new(position: f64) -> Self {
        Self::anchored_at(position, Instant::now())
    }

    pub fn anchored_at(position: f64, instant: Instant) -> Self {
        Self {
            anchor_position: position,
            anchor_instant: instant,
        }
    }

    /// Move the anchor to a freshly observed position.
    pub fn rebase(&mut self, position: f64) {
        self.anchor_position = position;
        self.anchor_instant = Instant::now();
    }

    /// `anchor_position + (now - anchor_instant)`. Not sanitized: callers
    /// decide what to do with negative or non-finite values.
    pub fn estimate(&self) -> f64 {
        self.anchor_position + self.anchor_instant.elapsed().as_secs_f64()
    }

    /// Signed difference between an observed position and the projection.
    pub fn drift(&self, observed: f64) -> f64 {
        observed - self.estimate()
    }
}

/// Usable position or `None` for NaN, infinite, or negative values.
pub fn valid_position(p: f64) -> Option<f64> {
    if p.is_finite() && p >= 0.0 { Some(p) } else { None }
}
