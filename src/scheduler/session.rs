use crate::lyrics::{ActiveLine, LyricTrack};
use crate::scheduler::{DisplayEvent, DisplaySink, PositionSource, SchedulerSettings};
use crate::timer::{PlaybackTimer, valid_position};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Cancelled,
    Finished,
}

enum Tick {
    Sleep(Duration),
    Finished,
    Cancelled,
}

/// One synchronization run over a single song's track.
pub struct Session {
    id: u64,
    track: LyricTrack,
    cancel: CancellationToken,
    /// `None` until the first emission so the first lookup always emits.
    last_emitted: Option<ActiveLine>,
    settings: SchedulerSettings,
    position: Arc<dyn PositionSource>,
    sink: Arc<dyn DisplaySink>,
}

impl Session {
    pub fn new(
        id: u64,
        track: LyricTrack,
        cancel: CancellationToken,
        settings: SchedulerSettings,
        position: Arc<dyn PositionSource>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            id,
            track,
            cancel,
            last_emitted: None,
            settings,
            position,
            sink,
        }
    }

    /// Run until cancelled or the track is exhausted.
    pub async fn run(mut self) -> SessionOutcome {
        if self.track.is_empty() {
            tracing::info!(session = self.id, "Empty track, nothing to schedule");
            return SessionOutcome::Finished;
        }

        let initial = tokio::select! {
            _ = self.cancel.cancelled() => return self.cancelled(),
            p = self.position.current_position() => p,
        };
        let mut timer = PlaybackTimer::new(initial);
        let mut last_resync = Instant::now();
        tracing::info!(
            session = self.id,
            lines = self.track.len(),
            player_time = initial,
            "Lyric scheduler started"
        );

        loop {
            if self.cancel.is_cancelled() {
                return self.cancelled();
            }

            let projected = timer.estimate();
            let resync_due = last_resync.elapsed() >= self.settings.resync_interval;
            if resync_due || valid_position(projected).is_none() {
                if !self.resync(&mut timer).await {
                    return self.cancelled();
                }
                last_resync = Instant::now();
            }

            let delay = match valid_position(timer.estimate()) {
                Some(pos) => match self.tick(pos).await {
                    Tick::Sleep(d) => d,
                    Tick::Finished => {
                        tracing::info!(session = self.id, "Lyric scheduler finished");
                        return SessionOutcome::Finished;
                    }
                    Tick::Cancelled => return self.cancelled(),
                },
                None => {
                    let projected = timer.estimate();
                    tracing::warn!(session = self.id, player_time = projected, "Invalid player time, skipping tick");
                    self.clamp_delay(-projected)
                }
            };
            let until_resync = self
                .settings
                .resync_interval
                .saturating_sub(last_resync.elapsed())
                .max(self.settings.min_sleep);

            tokio::select! {
                _ = self.cancel.cancelled() => return self.cancelled(),
                _ = tokio::time::sleep(delay.min(until_resync)) => {}
            }
        }
    }

    fn cancelled(&self) -> SessionOutcome {
        tracing::info!(session = self.id, "Lyric scheduler cancelled");
        SessionOutcome::Cancelled
    }

    /// Compare the projection with the player; rebase on large drift.
    /// Returns false if cancelled while waiting on the player.
    async fn resync(&self, timer: &mut PlaybackTimer) -> bool {
        let observed = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            p = self.position.current_position() => p,
        };
        let Some(observed) = valid_position(observed) else {
            tracing::debug!(session = self.id, player_time = observed, "Ignoring invalid player time on resync");
            return true;
        };
        let drift = timer.drift(observed);
        if drift.abs() > self.settings.drift_threshold {
            tracing::info!(
                session = self.id,
                projected = timer.estimate(),
                player_time = observed,
                drift,
                "Drift detected, rebasing"
            );
            timer.rebase(observed);
        }
        true
    }

    async fn tick(&mut self, pos: f64) -> Tick {
        let lookup = pos + self.settings.lookahead;
        let current = self.track.active_index(lookup);

        if self.last_emitted != Some(current) {
            let event = match current {
                ActiveLine::At(index) => {
                    let line = &self.track.lines()[index];
                    let diff_ms = (lookup - line.time) * 1000.0;
                    let window_ms = self.settings.timing_window.as_secs_f64() * 1000.0;
                    if diff_ms.abs() <= window_ms {
                        tracing::info!(
                            index,
                            player_time = pos,
                            lyric_time = line.time,
                            time_diff_ms = diff_ms,
                            lyric = %line.text,
                            "Broadcasting lyric"
                        );
                    } else {
                        tracing::warn!(
                            index,
                            player_time = pos,
                            lyric_time = line.time,
                            time_diff_ms = diff_ms,
                            lyric = %line.text,
                            "Lyric timing outside window, broadcasting anyway"
                        );
                    }
                    Some(DisplayEvent::Line(line.text.clone()))
                }
                ActiveLine::BeforeFirst => Some(DisplayEvent::AboutToStart),
                ActiveLine::NoLines => None,
            };
            if let Some(event) = event {
                if !self.emit(event).await {
                    return Tick::Cancelled;
                }
            }
            self.last_emitted = Some(current);
        }

        // Non-empty track: checked in `run`.
        let end = self.track.last().map(|l| l.time).unwrap_or(0.0) + self.settings.end_grace;
        if pos > end {
            tracing::info!(player_time = pos, last_lyric_time = end - self.settings.end_grace, "Song finished");
            if !self.emit(DisplayEvent::SongEnded).await {
                return Tick::Cancelled;
            }
            return Tick::Finished;
        }

        let next_boundary = match current {
            ActiveLine::BeforeFirst => self.track.get(0),
            ActiveLine::At(index) => self.track.get(index + 1),
            ActiveLine::NoLines => None,
        }
        .map(|line| line.time - self.settings.lookahead)
        .unwrap_or(end);
        Tick::Sleep(self.clamp_delay(next_boundary - pos))
    }

    async fn emit(&self, event: DisplayEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.sink.display(event).await;
        true
    }

    fn clamp_delay(&self, secs: f64) -> Duration {
        let min = self.settings.min_sleep.as_secs_f64();
        let max = self.settings.max_sleep.as_secs_f64();
        let secs = if secs.is_finite() { secs.clamp(min, max) } else { max };
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::parse_lrc;
    use crate::scheduler::testing::{ChannelSink, FakePlayer};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn spawn_session(
        raw: &str,
        player: Arc<FakePlayer>,
    ) -> (
        CancellationToken,
        tokio::task::JoinHandle<SessionOutcome>,
        UnboundedReceiver<(Duration, DisplayEvent)>,
    ) {
        let (sink, rx) = ChannelSink::new();
        let cancel = CancellationToken::new();
        let session = Session::new(
            1,
            parse_lrc(raw),
            cancel.clone(),
            SchedulerSettings::default(),
            player,
            Arc::new(sink),
        );
        (cancel, tokio::spawn(session.run()), rx)
    }

    fn line(text: &str) -> DisplayEvent {
        DisplayEvent::Line(text.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn emits_each_line_then_one_song_end() {
        let player = Arc::new(FakePlayer::at(0.0));
        let (_cancel, handle, mut rx) =
            spawn_session("[00:00.00]a\n[00:02.00]b\n[00:04.00]c", player.clone());

        assert_eq!(handle.await.unwrap(), SessionOutcome::Finished);
        let mut events = Vec::new();
        while let Ok((at, ev)) = rx.try_recv() {
            events.push((at, ev));
        }
        let kinds: Vec<_> = events.iter().map(|(_, e)| e.clone()).collect();
        assert_eq!(kinds, vec![line("a"), line("b"), line("c"), DisplayEvent::SongEnded]);

        // b is shown slightly ahead of its 2.0s timestamp.
        let b_at = events[1].0.as_secs_f64();
        assert!((1.89..=1.95).contains(&b_at), "b emitted at {b_at}");
        let end_at = events[3].0.as_secs_f64();
        assert!((9.0..=9.1).contains(&end_at), "end emitted at {end_at}");

        // Projection, not polling: initial sample plus one resync.
        assert!(player.queries() <= 3, "queried {} times", player.queries());
    }

    #[tokio::test(start_paused = true)]
    async fn about_to_start_before_first_line() {
        let player = Arc::new(FakePlayer::at(0.0));
        let (_cancel, handle, mut rx) = spawn_session("[00:01.00]x", player);

        assert_eq!(rx.recv().await.unwrap().1, DisplayEvent::AboutToStart);
        let (at, ev) = rx.recv().await.unwrap();
        assert_eq!(ev, line("x"));
        assert!(at >= Duration::from_millis(890) && at <= Duration::from_millis(950));
        assert_eq!(rx.recv().await.unwrap().1, DisplayEvent::SongEnded);
        assert_eq!(handle.await.unwrap(), SessionOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_back_before_first_line_announces_again() {
        let player = Arc::new(FakePlayer::at(11.0));
        let (cancel, _handle, mut rx) = spawn_session("[00:10.00]x\n[00:30.00]y", player.clone());

        assert_eq!(rx.recv().await.unwrap().1, line("x"));
        player.seek(0.0);
        // Picked up on the next resync.
        let (at, ev) = rx.recv().await.unwrap();
        assert_eq!(ev, DisplayEvent::AboutToStart);
        assert!(at <= Duration::from_millis(5100), "resync at {at:?}");
        assert_eq!(rx.recv().await.unwrap().1, line("x"));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn drift_resync_follows_a_seek() {
        let player = Arc::new(FakePlayer::at(0.0));
        let raw = "[00:00.00]a\n[00:02.00]b\n[00:04.00]c\n[00:30.00]d\n[00:40.00]e";
        let (cancel, _handle, mut rx) = spawn_session(raw, player.clone());

        assert_eq!(rx.recv().await.unwrap().1, line("a"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        player.seek(30.0);

        let mut seen = Vec::new();
        loop {
            let (at, ev) = rx.recv().await.unwrap();
            let done = ev == line("d");
            seen.push(ev);
            if done {
                assert!(at >= Duration::from_millis(4900) && at <= Duration::from_millis(5200), "d at {at:?}");
                break;
            }
        }
        // The projection keeps running until the resync notices the seek.
        assert_eq!(seen, vec![line("b"), line("c"), line("d")]);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_emissions() {
        let player = Arc::new(FakePlayer::at(0.0));
        let (cancel, handle, mut rx) =
            spawn_session("[00:00.00]a\n[00:02.00]b\n[00:04.00]c", player);

        assert_eq!(rx.recv().await.unwrap().1, line("a"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), SessionOutcome::Cancelled);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn negative_positions_are_skipped() {
        let player = Arc::new(FakePlayer::at(-3.0));
        let (cancel, _handle, mut rx) = spawn_session("[00:00.00]a\n[00:10.00]b", player);

        let (at, ev) = rx.recv().await.unwrap();
        assert_eq!(ev, line("a"));
        assert!(at >= Duration::from_millis(2900), "a at {at:?}");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_track_finishes_without_lookup() {
        let player = Arc::new(FakePlayer::at(0.0));
        let (_cancel, handle, mut rx) = spawn_session("not lrc", player.clone());

        assert_eq!(handle.await.unwrap(), SessionOutcome::Finished);
        assert!(rx.try_recv().is_err());
        assert_eq!(player.queries(), 0);
    }
}
