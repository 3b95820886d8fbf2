//! Local broadcast endpoint and the process singleton lock guarding it.

pub mod lock;
pub mod server;

pub use lock::ProcessLock;
pub use server::BroadcastServer;

use std::io;

/// Lifecycle failures; these abort startup.
#[derive(thiserror::Error, Debug)]
pub enum IpcError {
    #[error("another lyrics server instance is already running{}", pid_suffix(.pid))]
    AlreadyRunning { pid: Option<i32> },
    #[error("failed to acquire lock file {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: io::Error,
    },
}

fn pid_suffix(pid: &Option<i32>) -> String {
    pid.map(|p| format!(" (pid {p})")).unwrap_or_default()
}
