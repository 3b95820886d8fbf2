use crate::lyrics::parse_lrc;
use crate::scheduler::{DisplayEvent, DisplaySink, PositionSource, SchedulerSettings, Session};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// The registered session: its id and the token that stops it.
#[derive(Debug)]
struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

/// Serializes session start/stop so at most one session is registered.
pub struct SchedulerHandle {
    slot: Arc<Mutex<Option<ActiveSession>>>,
    next_id: AtomicU64,
    settings: SchedulerSettings,
    position: Arc<dyn PositionSource>,
    sink: Arc<dyn DisplaySink>,
}

impl SchedulerHandle {
    pub fn new(
        settings: SchedulerSettings,
        position: Arc<dyn PositionSource>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            settings,
            position,
            sink,
        }
    }

    /// Replace whatever is running with a session for `raw` lyrics.
    ///
    /// Text without timestamps is forwarded verbatim instead of scheduled.
    pub async fn start_session(&self, raw: &str) {
        let mut slot = self.slot.lock().await;
        self.drain(&mut slot).await;

        let track = parse_lrc(raw);
        if track.is_empty() {
            drop(slot);
            tracing::warn!("No lyrics lines found, broadcasting raw text");
            self.sink.display(DisplayEvent::Raw(raw.to_string())).await;
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        tracing::info!(session = id, lines_count = track.len(), "Starting lyric scheduler");
        let session = Session::new(
            id,
            track,
            cancel.clone(),
            self.settings,
            self.position.clone(),
            self.sink.clone(),
        );
        *slot = Some(ActiveSession { id, cancel });

        let registry = self.slot.clone();
        tokio::spawn(async move {
            let outcome = session.run().await;
            let mut slot = registry.lock().await;
            // A superseded session must not touch its successor's registration.
            if slot.as_ref().is_some_and(|s| s.id == id) {
                *slot = None;
            }
            tracing::debug!(session = id, ?outcome, "Session cleaned up");
        });
    }

    /// Cancel the current session, if any, without starting another.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        self.drain(&mut slot).await;
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Best-effort: signal cancellation and give the old session a short
    /// window to notice. Not a join.
    async fn drain(&self, slot: &mut Option<ActiveSession>) {
        if let Some(old) = slot.take() {
            tracing::info!(session = old.id, "Stopping previous lyric scheduler");
            old.cancel.cancel();
            tokio::time::sleep(self.settings.handoff_grace).await;
        }
    }
}
