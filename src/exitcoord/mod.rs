//! The Exit Coordinator (§4.4): decouples "the user's command finished"
//! from "the engine shuts down" via a filesystem FIFO rendezvous plus a
//! quiescence window, so no buffered output or in-flight command is lost
//! around subprocess termination.
//!
//! There's no teacher file for this exact mechanism — `kild-daemon` relies
//! on PTY EOF directly, one of the three naive designs this component
//! exists to avoid (§4.4's Design problem). The surrounding style (tempdir
//! handling, `tracing` events, `spawn_blocking` for a blocking fs op) is
//! grounded on `kild-daemon::pty::output::spawn_pty_reader`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{EngineError, EngineResult};

/// Owns the rendezvous FIFO's containing directory so it is unlinked when
/// the session ends, and the flag ensuring `exit\n` is written at most
/// once (§4.4 invariant).
pub struct ExitCoordinator {
    _tempdir: TempDir,
    fifo_path: PathBuf,
    released: bool,
}

impl ExitCoordinator {
    /// Create the temp directory and pick the FIFO path inside it. Does
    /// not create the FIFO itself — the `wait-exit` helper does that via
    /// `mkfifo`, which is how the watcher detects the helper has reached
    /// its rendezvous point.
    pub fn new() -> EngineResult<Self> {
        let tempdir = TempDir::new().map_err(EngineError::Io)?;
        let fifo_path = tempdir.path().join("htty-exit.fifo");
        Ok(Self {
            _tempdir: tempdir,
            fifo_path,
            released: false,
        })
    }

    pub fn fifo_path(&self) -> &Path {
        &self.fifo_path
    }

    /// Build the shell wrapper the PTY Driver spawns instead of the bare
    /// user command: run the user command, capture its exit status, block
    /// on the FIFO rendezvous, then re-exit with the preserved status.
    pub fn wrap_command(&self, engine_exe: &str, user_cmd: &str) -> String {
        format!(
            "{user_cmd}; ec=$?; {engine_exe} wait-exit {fifo}; exit $ec",
            fifo = self.fifo_path.display()
        )
    }

    /// Write `exit\n` to the FIFO, unblocking the `wait-exit` helper.
    /// Suppressed after the first successful call.
    pub async fn release(&mut self) -> EngineResult<()> {
        if self.released {
            return Ok(());
        }
        let path = self.fifo_path.clone();
        tokio::task::spawn_blocking(move || {
            use std::io::Write as _;
            let mut file = std::fs::OpenOptions::new().write(true).open(&path)?;
            file.write_all(b"exit\n")
        })
        .await
        .map_err(|e| EngineError::PtyAllocFailed(format!("release join: {e}")))?
        .map_err(EngineError::Io)?;
        self.released = true;
        debug!(event = "htty.exitcoord.released");
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Spawn the watcher task that polls for the FIFO's existence every
/// `poll_interval`. Sends exactly one `()` the moment the path appears,
/// then exits — the canonical signal that the user command has finished
/// and the helper is now blocked reading the FIFO.
pub fn spawn_watcher(path: PathBuf, poll_interval: Duration) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        loop {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                if tx.send(()).await.is_err() {
                    warn!(event = "htty.exitcoord.watcher_send_failed");
                }
                debug!(event = "htty.exitcoord.fifo_detected", path = %path.display());
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_command_preserves_exit_status() {
        let coord = ExitCoordinator::new().unwrap();
        let wrapped = coord.wrap_command("/usr/bin/htty-engine", "vim file.txt");
        assert!(wrapped.starts_with("vim file.txt; ec=$?;"));
        assert!(wrapped.ends_with("exit $ec"));
        assert!(wrapped.contains("wait-exit"));
        assert!(wrapped.contains(&coord.fifo_path().display().to_string()));
    }

    #[tokio::test]
    async fn watcher_fires_once_fifo_path_exists() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("marker");
        let mut rx = spawn_watcher(path.clone(), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, b"").unwrap();
        let signaled = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("watcher should fire after path appears");
        assert!(signaled.is_some());
    }

    #[tokio::test]
    async fn release_is_idempotent_after_first_success() {
        let mut coord = ExitCoordinator::new().unwrap();
        // Simulate the FIFO existing as a regular file so OpenOptions::open succeeds
        // for this test's purposes (a real run uses an actual mkfifo'd path).
        std::fs::write(coord.fifo_path(), b"").unwrap();
        coord.release().await.unwrap();
        assert!(coord.is_released());
        // Second call is a no-op and must not error even though the file
        // has already received its line.
        coord.release().await.unwrap();
    }
}
