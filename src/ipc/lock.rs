use crate::ipc::IpcError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Exclusive per-endpoint lock: a pid file held under `flock`.
///
/// Released (unlocked and deleted) on [`ProcessLock::release`] or drop.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    file: Option<File>,
}

impl ProcessLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, IpcError> {
        let path = path.into();
        clean_stale_lock(&path)?;

        let lock_err = |source: io::Error| IpcError::Lock {
            path: path.display().to_string(),
            source,
        };
        // No truncate here: the pid of a concurrent holder must survive until
        // we actually own the lock.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;

        if let Err(e) = try_flock(&file) {
            if e.kind() == io::ErrorKind::WouldBlock {
                return Err(IpcError::AlreadyRunning {
                    pid: read_pid(&path),
                });
            }
            return Err(lock_err(e));
        }

        let pid = std::process::id();
        file.set_len(0)
            .and_then(|_| writeln!(file, "{pid}"))
            .and_then(|_| file.flush())
            .map_err(lock_err)?;

        tracing::info!(lock_file = %path.display(), pid, "Acquired process lock");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(file) = self.file.take() {
            // SAFETY: the descriptor is owned by `file`, which is still open.
            unsafe {
                libc::flock(file.as_raw_fd(), libc::LOCK_UN);
            }
            drop(file);
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(lock_file = %self.path.display(), error = %e, "Failed to remove lock file");
            }
            tracing::info!(lock_file = %self.path.display(), "Released process lock");
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn try_flock(file: &File) -> io::Result<()> {
    // SAFETY: flock only reads the descriptor, which `file` keeps open.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether `pid` names a live process. Uses the signal-0 probe: nothing is
/// delivered, only existence and permission are checked.
pub fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs error checking only.
    let ret = unsafe { libc::kill(pid, 0) };
    if ret == 0 {
        return true;
    }
    // EPERM: it exists but belongs to someone else.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Remove a lock file that cannot belong to a live instance. A file naming a
/// live process is a conflict.
fn clean_stale_lock(path: &Path) -> Result<(), IpcError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            tracing::warn!(lock_file = %path.display(), error = %e, "Failed to read lock file, removing it");
            remove_stale(path);
            return Ok(());
        }
    };

    let pid_str = content.trim();
    if pid_str.is_empty() {
        tracing::warn!(lock_file = %path.display(), "Lock file is empty, removing it");
        remove_stale(path);
        return Ok(());
    }

    let pid = match pid_str.parse::<i32>() {
        Ok(pid) if pid > 0 => pid,
        _ => {
            tracing::warn!(lock_file = %path.display(), pid_str, "Invalid PID in lock file, removing it");
            remove_stale(path);
            return Ok(());
        }
    };

    if !is_process_alive(pid) {
        tracing::info!(old_pid = pid, "Process in lock file is not running, removing lock file");
        remove_stale(path);
        return Ok(());
    }

    tracing::info!(existing_pid = pid, "Another process is still running");
    Err(IpcError::AlreadyRunning { pid: Some(pid) })
}

fn remove_stale(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(lock_file = %path.display(), error = %e, "Failed to remove stale lock file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Above any configurable pid_max (2^22), so never a live process.
    const DEAD_PID: i32 = i32::MAX - 1;

    #[test]
    fn fresh_lock_records_own_pid_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sock.lock");

        let lock = ProcessLock::acquire(&path).unwrap();
        let recorded = fs::read_to_string(&path).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());

        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn dead_owner_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sock.lock");
        fs::write(&path, format!("{DEAD_PID}\n")).unwrap();

        let lock = ProcessLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_or_empty_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        for content in ["", "   \n", "not-a-pid", "-5", "0"] {
            let path = dir.path().join("app.sock.lock");
            fs::write(&path, content).unwrap();
            let lock = ProcessLock::acquire(&path).unwrap();
            lock.release();
        }
    }

    #[test]
    fn live_owner_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sock.lock");
        // This test process is certainly alive.
        fs::write(&path, std::process::id().to_string()).unwrap();

        let err = ProcessLock::acquire(&path).unwrap_err();
        assert!(matches!(err, IpcError::AlreadyRunning { pid: Some(p) } if p == std::process::id() as i32));
        assert!(err.to_string().contains("already running"));
        // The conflicting artifact is left alone.
        assert!(path.exists());
    }

    #[test]
    fn second_acquire_in_same_process_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sock.lock");
        let _held = ProcessLock::acquire(&path).unwrap();

        assert!(matches!(
            ProcessLock::acquire(&path),
            Err(IpcError::AlreadyRunning { .. })
        ));
    }

    #[test]
    fn flock_conflict_is_would_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sock.lock");
        let _held = ProcessLock::acquire(&path).unwrap();

        let other = OpenOptions::new().write(true).open(&path).unwrap();
        let err = try_flock(&other).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn liveness_check() {
        assert!(is_process_alive(std::process::id() as i32));
        assert!(!is_process_alive(DEAD_PID));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(-1));
    }
}
