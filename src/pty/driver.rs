//! The PTY Driver (§4.1): owns the master/slave pair, spawns and reaps the
//! child, and transports bytes between the master fd and the rest of the
//! engine.
//!
//! Grounded on the teacher crate's `kild-daemon::pty::manager::ManagedPty`
//! (master/writer/child ownership, resize, kill) and
//! `kild-daemon::pty::output::spawn_pty_reader` (the `spawn_blocking` read
//! loop). Unlike the teacher, there is exactly one PTY per engine instance
//! (no `HashMap<String, ManagedPty>`) since a session here is the whole
//! process, not one of many daemon-managed sessions.

use std::io::Write as _;
use std::sync::{Arc, Mutex};

use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::{EngineError, EngineResult};

const MIN_DIMENSION: u16 = 1;
const MAX_DIMENSION: u16 = 1024;

/// Events the PTY Driver's background tasks push to the Session Broker.
/// Distinct from `WireEvent`/the in-process `Event` the broker re-derives
/// from these — this is the driver's internal vocabulary.
#[derive(Debug)]
pub enum PtyDriverEvent {
    Pid(u32),
    Output(Vec<u8>),
    /// The read loop hit EOF or an unrecoverable read error. Sent exactly
    /// once; the broker decides whether and when to exit afterward.
    Done,
    /// The child process has exited; carries the engine's own exit-code
    /// convention (negative = terminated by that signal number).
    ExitCode(i32),
}

/// What `start` needs to spawn the child.
pub struct SpawnSpec<'a> {
    pub command: &'a str,
    pub args: &'a [String],
    pub env_overrides: &'a [(String, String)],
    pub cwd: &'a std::path::Path,
    pub cols: u16,
    pub rows: u16,
}

/// Owns the live PTY pair. The child process handle itself is moved into
/// the background wait loop (see `spawn_wait_loop`) since only one owner
/// may call `Child::wait`; termination is done by signaling the process
/// group via `pid`, not by holding the handle here.
pub struct PtyDriver {
    master: Box<dyn MasterPty + Send>,
    writer: Arc<Mutex<Box<dyn std::io::Write + Send>>>,
    size: PtySize,
    pid: Option<u32>,
}

impl std::fmt::Debug for PtyDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyDriver")
            .field("size", &self.size)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl PtyDriver {
    /// Open a pty, spawn `spec.command`, and start the background read and
    /// wait loops. Returns the driver plus the event channel the broker
    /// should poll in its `select!`.
    pub fn start(spec: SpawnSpec<'_>) -> EngineResult<(Self, mpsc::Receiver<PtyDriverEvent>)> {
        validate_dimensions(spec.cols, spec.rows)?;

        let pty_system = native_pty_system();
        let size = PtySize {
            rows: spec.rows,
            cols: spec.cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system
            .openpty(size)
            .map_err(|e| EngineError::PtyAllocFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(spec.command);
        cmd.args(spec.args);
        cmd.cwd(spec.cwd);
        cmd.env("TERM", "xterm-256color");
        for (key, value) in spec.env_overrides {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError::SpawnFailed(e.to_string()))?;
        // The child inherited the slave fd across fork/exec; our copy must
        // be dropped or the kernel will never signal EOF on the master once
        // the child exits (it would still see the fd open here).
        drop(pair.slave);

        let pid = child.process_id();
        info!(event = "htty.pty.spawn_completed", command = spec.command, pid = ?pid);

        let writer = pair.master.take_writer().map_err(|e| {
            let _ = child.kill();
            EngineError::PtyAllocFailed(format!("take_writer: {e}"))
        })?;
        let reader = pair.master.try_clone_reader().map_err(|e| {
            let _ = child.kill();
            EngineError::PtyAllocFailed(format!("clone_reader: {e}"))
        })?;

        let (event_tx, event_rx) = mpsc::channel(1024);

        if let Some(pid) = pid {
            let _ = event_tx.try_send(PtyDriverEvent::Pid(pid));
        }

        spawn_read_loop(reader, event_tx.clone());
        spawn_wait_loop(child, event_tx);

        Ok((
            Self {
                master: pair.master,
                writer: Arc::new(Mutex::new(writer)),
                size,
                pid,
            },
            event_rx,
        ))
    }

    /// Write bytes to the master fd, retrying partial writes until the
    /// buffer drains or the fd reports broken.
    pub fn write(&self, mut bytes: &[u8]) -> EngineResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| EngineError::WriteBroken)?;
        while !bytes.is_empty() {
            match writer.write(bytes) {
                Ok(0) => return Err(EngineError::WriteBroken),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(event = "htty.pty.write_failed", error = %e);
                    return Err(EngineError::WriteBroken);
                }
            }
        }
        writer.flush().map_err(|_| EngineError::WriteBroken)?;
        Ok(())
    }

    /// Resize the master fd's window size. Validates bounds first so a
    /// malformed `resize` command never reaches the ioctl.
    pub fn resize(&mut self, cols: u16, rows: u16) -> EngineResult<()> {
        validate_dimensions(cols, rows)?;
        let new_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master
            .resize(new_size)
            .map_err(|e| EngineError::ResizeFailed(e.to_string()))?;
        self.size = new_size;
        debug!(event = "htty.pty.resize_completed", cols = cols, rows = rows);
        Ok(())
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Send SIGTERM to the child's process group.
    pub fn terminate_graceful(&self) -> EngineResult<()> {
        self.signal_group(nix::sys::signal::Signal::SIGTERM)
    }

    /// Send SIGKILL to the child's process group.
    pub fn terminate_forced(&self) -> EngineResult<()> {
        self.signal_group(nix::sys::signal::Signal::SIGKILL)
    }

    fn signal_group(&self, signal: nix::sys::signal::Signal) -> EngineResult<()> {
        let Some(pid) = self.pid else {
            return Err(EngineError::ChildExited);
        };
        let pgid = nix::unistd::Pid::from_raw(pid as i32);
        match nix::sys::signal::killpg(pgid, signal) {
            Ok(()) => Ok(()),
            // ESRCH: the group is already gone, which is the outcome we wanted.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(EngineError::PtyAllocFailed(format!("signal: {e}"))),
        }
    }
}

fn validate_dimensions(cols: u16, rows: u16) -> EngineResult<()> {
    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&cols)
        || !(MIN_DIMENSION..=MAX_DIMENSION).contains(&rows)
    {
        return Err(EngineError::ResizeFailed(format!(
            "dimensions out of bounds: {cols}x{rows}"
        )));
    }
    Ok(())
}

fn spawn_read_loop(
    mut reader: Box<dyn std::io::Read + Send>,
    event_tx: mpsc::Sender<PtyDriverEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; 128 * 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!(event = "htty.pty.reader_eof");
                    break;
                }
                Ok(n) => {
                    if event_tx
                        .blocking_send(PtyDriverEvent::Output(buf[..n].to_vec()))
                        .is_err()
                    {
                        debug!(event = "htty.pty.reader_channel_closed");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(event = "htty.pty.reader_error", error = %e);
                    break;
                }
            }
        }
        let _ = event_tx.blocking_send(PtyDriverEvent::Done);
    })
}

fn spawn_wait_loop(
    mut child: Box<dyn Child + Send + Sync>,
    event_tx: mpsc::Sender<PtyDriverEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || match child.wait() {
        Ok(status) => {
            let code = exit_code_from_status(&status);
            let _ = event_tx.blocking_send(PtyDriverEvent::ExitCode(code));
        }
        Err(e) => {
            error!(event = "htty.pty.wait_failed", error = %e);
        }
    })
}

/// Map a `portable_pty::ExitStatus` to a plain process exit code.
/// `portable_pty` doesn't portably expose the raw signal number, so the
/// negative-for-signal convention (§4.4) is applied by the broker, which
/// already knows whether it took the forced-termination path.
fn exit_code_from_status(status: &portable_pty::ExitStatus) -> i32 {
    if status.success() {
        0
    } else {
        status.exit_code() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>(
        command: &'a str,
        args: &'a [String],
        env: &'a [(String, String)],
        cwd: &'a std::path::Path,
    ) -> SpawnSpec<'a> {
        SpawnSpec {
            command,
            args,
            env_overrides: env,
            cwd,
            cols: 80,
            rows: 24,
        }
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(validate_dimensions(0, 24).is_err());
        assert!(validate_dimensions(80, 0).is_err());
    }

    #[test]
    fn rejects_dimensions_over_1024() {
        assert!(validate_dimensions(1025, 24).is_err());
        assert!(validate_dimensions(80, 2000).is_err());
    }

    #[test]
    fn accepts_boundary_dimensions() {
        assert!(validate_dimensions(1, 1).is_ok());
        assert!(validate_dimensions(1024, 1024).is_ok());
    }

    #[test]
    fn start_with_nonexistent_command_fails_with_spawn_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let args: Vec<String> = vec![];
        let env: Vec<(String, String)> = vec![];
        let result = PtyDriver::start(spec(
            "/nonexistent/binary/that/does/not/exist",
            &args,
            &env,
            tmp.path(),
        ));
        assert!(matches!(result, Err(EngineError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn start_and_receive_output_and_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let args = vec!["hi".to_string()];
        let env: Vec<(String, String)> = vec![];
        let (driver, mut rx) = PtyDriver::start(spec("echo", &args, &env, tmp.path())).unwrap();
        assert!(driver.pid().is_some());

        let mut saw_output = false;
        let mut saw_exit = false;
        while let Some(event) = rx.recv().await {
            match event {
                PtyDriverEvent::Output(bytes) => {
                    if bytes.windows(2).any(|w| w == b"hi") {
                        saw_output = true;
                    }
                }
                PtyDriverEvent::ExitCode(code) => {
                    assert_eq!(code, 0);
                    saw_exit = true;
                }
                PtyDriverEvent::Done => break,
                PtyDriverEvent::Pid(_) => {}
            }
            if saw_exit {
                break;
            }
        }
        assert!(saw_output || saw_exit);
    }
}
