//! Broadcast server: pushes the current lyric text to every connected client.
//!
//! Protocol is a raw byte push with no framing: the current text on connect,
//! then the replacement text on every change. Clients never send anything
//! meaningful; reads only detect disconnects.

use crate::ipc::{IpcError, ProcessLock};
use crate::scheduler::{DisplayEvent, DisplaySink};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lock artifact path for a socket: `<socket>.lock`.
pub fn lock_path_for(socket_path: &Path) -> PathBuf {
    let mut name = socket_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

pub struct BroadcastServer {
    socket_path: PathBuf,
    mirror_path: Option<PathBuf>,
    /// Guards both the client set and, nested inside, `current` writes, so
    /// clients observe texts in the order they were set.
    clients: Mutex<HashMap<u64, OwnedWriteHalf>>,
    current: std::sync::Mutex<String>,
    next_client: AtomicU64,
    shutdown: CancellationToken,
    lock: std::sync::Mutex<Option<ProcessLock>>,
}

impl BroadcastServer {
    /// Take the singleton lock, bind the socket and start accepting.
    ///
    /// The lock is taken first so a second instance fails before touching
    /// the live instance's socket.
    pub async fn start(
        socket_path: impl Into<PathBuf>,
        mirror_path: Option<PathBuf>,
    ) -> Result<Arc<Self>, IpcError> {
        let socket_path = socket_path.into();
        let lock = ProcessLock::acquire(lock_path_for(&socket_path))?;

        let bind_err = |source: io::Error| IpcError::Bind {
            path: socket_path.display().to_string(),
            source,
        };
        match std::fs::remove_file(&socket_path) {
            Ok(()) => tracing::debug!(socket_path = %socket_path.display(), "Removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_err(e)),
        }
        let listener = UnixListener::bind(&socket_path).map_err(bind_err)?;
        tracing::info!(socket_path = %socket_path.display(), "IPC server listening");

        let server = Arc::new(Self {
            socket_path,
            mirror_path,
            clients: Mutex::new(HashMap::new()),
            current: std::sync::Mutex::new(String::new()),
            next_client: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            lock: std::sync::Mutex::new(Some(lock)),
        });
        tokio::spawn(server.clone().accept_loop(listener));
        Ok(server)
    }

    pub fn current_text(&self) -> String {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Replace the current text and push it to every client. Clients whose
    /// write fails are dropped.
    pub async fn broadcast(&self, text: &str) {
        self.write_mirror(text).await;

        let mut clients = self.clients.lock().await;
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();

        let bytes = text.as_bytes();
        let results = join_all(
            clients
                .iter_mut()
                .map(|(id, writer)| async move { (*id, write_with_deadline(writer, bytes).await) }),
        )
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                tracing::warn!(client = id, error = %e, "Failed to write to client, removing");
                if let Some(mut writer) = clients.remove(&id) {
                    let _ = writer.shutdown().await;
                }
            }
        }
    }

    /// Stop accepting, drop all clients, remove the socket and release the lock.
    pub async fn close(&self) {
        tracing::info!(clients = self.client_count().await, "Closing IPC server");
        self.shutdown.cancel();
        for (_, mut writer) in self.clients.lock().await.drain() {
            let _ = writer.shutdown().await;
        }
        if let Err(e) = std::fs::remove_file(&self.socket_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(socket_path = %self.socket_path.display(), error = %e, "Failed to remove socket");
        }
        let lock = self.lock.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(lock) = lock {
            lock.release();
        }
    }

    async fn write_mirror(&self, text: &str) {
        let Some(path) = &self.mirror_path else {
            return;
        };
        if text.is_empty() {
            return;
        }
        if let Err(e) = tokio::fs::write(path, format!("{text}\n")).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write lyrics mirror");
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: UnixListener) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let server = self.clone();
                        tokio::spawn(async move { server.handle_connection(stream).await });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept IPC connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
        tracing::debug!("Accept loop stopped");
    }

    async fn handle_connection(&self, stream: UnixStream) {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        let (mut reader, mut writer) = stream.into_split();

        {
            // Register under the client lock so no broadcast slips in between
            // the initial write and registration.
            let mut clients = self.clients.lock().await;
            let text = self.current_text();
            if let Err(e) = write_with_deadline(&mut writer, text.as_bytes()).await {
                tracing::error!(client = id, error = %e, "Failed to send initial lyrics");
                return;
            }
            clients.insert(id, writer);
        }
        tracing::info!(client = id, "Display client connected");

        let mut buf = [0u8; 256];
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                },
            }
        }

        if let Some(mut writer) = self.clients.lock().await.remove(&id) {
            let _ = writer.shutdown().await;
        }
        tracing::info!(client = id, "Display client disconnected");
    }
}

#[async_trait]
impl DisplaySink for BroadcastServer {
    async fn display(&self, event: DisplayEvent) {
        self.broadcast(event.text()).await;
    }
}

async fn write_with_deadline(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    match tokio::time::timeout(CLIENT_WRITE_TIMEOUT, async {
        writer.write_all(bytes).await?;
        writer.flush().await
    })
    .await
    {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "client write timed out")),
    }
}
