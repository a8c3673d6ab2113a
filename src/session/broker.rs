//! The Session Broker (§4.3): the single task that owns the Terminal
//! Model, dispatches commands, and fans events out to subscribers. Hosts
//! the Exit Coordinator's quiescence logic.
//!
//! Grounded on `kild-daemon::session::manager::SessionManager`'s
//! orchestration role and `kild-daemon::server::connection::handle_connection`'s
//! `tokio::select!` dispatch loop — generalized from "many daemon-tracked
//! sessions fanning out over a Unix socket" to "one session fanning out
//! to in-process subscribers", since this engine is one session per
//! process.

use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::exitcoord::{self, ExitCoordinator};
use crate::protocol::keys::{self, KeyElement};
use crate::pty::{PtyDriver, PtyDriverEvent, SpawnSpec};
use crate::terminal::TerminalModel;

use super::state::{Event, EventKind, SessionState, Subscription, SubscriptionId};

/// Client-facing commands (§4.3's command table). `CommandCompleted` is
/// deliberately absent — it is produced internally by the FIFO watcher,
/// never submitted by a client.
#[derive(Debug, Clone)]
pub enum Command {
    SendKeys(Vec<KeyElement>),
    TakeSnapshot,
    Resize { cols: u16, rows: u16 },
    Exit,
    Debug(String),
}

#[derive(Debug)]
pub enum CommandAck {
    Enqueued,
    Rejected(EngineError),
}

enum BrokerRequest {
    Submit(Command, oneshot::Sender<CommandAck>),
    Subscribe(
        Vec<EventKind>,
        oneshot::Sender<(SubscriptionId, mpsc::Receiver<Event>)>,
    ),
}

/// Lightweight handle given to callers (the in-process API and the wire
/// shim); the broker task itself is never exposed directly.
#[derive(Clone)]
pub struct BrokerHandle {
    request_tx: mpsc::Sender<BrokerRequest>,
}

impl BrokerHandle {
    pub async fn submit(&self, command: Command) -> EngineResult<CommandAck> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.request_tx
            .send(BrokerRequest::Submit(command, ack_tx))
            .await
            .map_err(|_| EngineError::ChildExited)?;
        ack_rx.await.map_err(|_| EngineError::ChildExited)
    }

    pub async fn subscribe(
        &self,
        kinds: Vec<EventKind>,
    ) -> EngineResult<(SubscriptionId, mpsc::Receiver<Event>)> {
        let (tx, rx) = oneshot::channel();
        self.request_tx
            .send(BrokerRequest::Subscribe(kinds, tx))
            .await
            .map_err(|_| EngineError::ChildExited)?;
        rx.await.map_err(|_| EngineError::ChildExited)
    }
}

/// Everything needed to spawn a new session.
pub struct SpawnOptions {
    pub command: String,
    pub args: Vec<String>,
    pub env_overrides: Vec<(String, String)>,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub config: EngineConfig,
    /// Path to the engine's own binary, used in the Exit Coordinator's
    /// shell wrapper to invoke `wait-exit`.
    pub engine_exe: String,
}

/// Spawn the PTY, the Terminal Model, the Exit Coordinator, and the
/// broker's own task. Returns a handle plus the task's `JoinHandle` so the
/// caller can await full shutdown.
pub fn spawn(opts: SpawnOptions) -> EngineResult<(BrokerHandle, tokio::task::JoinHandle<()>)> {
    let exit_coord = ExitCoordinator::new()?;
    let user_cmd_line = shell_join(&opts.command, &opts.args);
    let wrapped = exit_coord.wrap_command(&opts.engine_exe, &user_cmd_line);

    let (pty, pty_events) = PtyDriver::start(SpawnSpec {
        command: "/bin/sh",
        args: &["-c".to_string(), wrapped],
        env_overrides: &opts.env_overrides,
        cwd: &opts.cwd,
        cols: opts.cols,
        rows: opts.rows,
    })?;

    let fifo_rx = exitcoord::spawn_watcher(
        exit_coord.fifo_path().to_path_buf(),
        opts.config.fifo_poll_interval,
    );

    let model = TerminalModel::new(opts.cols, opts.rows, opts.config.scrollback_cap_bytes / 64);

    let (request_tx, request_rx) = mpsc::channel(256);
    let broker = SessionBroker {
        pty,
        pty_events,
        model,
        config: opts.config,
        subscriptions: Vec::new(),
        next_sub_id: 1,
        state: SessionState::Starting,
        request_rx,
        exit_coord,
        fifo_rx,
        pending_waitexit: false,
        last_command_at: Instant::now(),
        child_exit_code: None,
        exit_requested: false,
        force_terminated: false,
    };

    let join = tokio::spawn(broker.run());
    Ok((BrokerHandle { request_tx }, join))
}

/// Quote-join a command and argv into a single shell command line. Good
/// enough for the common case (no embedded quotes); the engine's own
/// `serve`/`wait-exit` surface never needs more than that.
fn shell_join(command: &str, args: &[String]) -> String {
    let mut parts = vec![quote(command)];
    parts.extend(args.iter().map(|a| quote(a)));
    parts.join(" ")
}

fn quote(s: &str) -> String {
    if s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c)) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

struct SessionBroker {
    pty: PtyDriver,
    pty_events: mpsc::Receiver<PtyDriverEvent>,
    model: TerminalModel,
    config: EngineConfig,
    subscriptions: Vec<Subscription>,
    next_sub_id: SubscriptionId,
    state: SessionState,
    request_rx: mpsc::Receiver<BrokerRequest>,
    exit_coord: ExitCoordinator,
    fifo_rx: mpsc::Receiver<()>,
    pending_waitexit: bool,
    last_command_at: Instant,
    child_exit_code: Option<i32>,
    exit_requested: bool,
    /// Set once the `Exit` path has to escalate past the quiescent wait
    /// (SIGTERM or SIGKILL sent). Diagnostic only; `child_exit_code`'s sign
    /// is what downstream consumers see (§4.4).
    force_terminated: bool,
}

impl SessionBroker {
    async fn run(mut self) {
        let mut quiescence_tick = tokio::time::interval(self.config.quiescence_tick);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            if self.state == SessionState::Terminated {
                break;
            }

            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some(BrokerRequest::Submit(command, ack_tx)) => {
                            self.last_command_at = Instant::now();
                            let ack = self.handle_command(command).await;
                            let _ = ack_tx.send(ack);
                        }
                        Some(BrokerRequest::Subscribe(kinds, reply_tx)) => {
                            let (id, rx) = self.add_subscriber(kinds);
                            let _ = reply_tx.send((id, rx));
                        }
                        None => {
                            debug!(event = "htty.broker.request_channel_closed");
                            self.state = SessionState::Draining;
                        }
                    }
                }

                event = self.pty_events.recv() => {
                    match event {
                        Some(PtyDriverEvent::Pid(pid)) => {
                            if self.state == SessionState::Starting {
                                self.state = SessionState::Running;
                            }
                            self.broadcast(Event::Pid(pid));
                        }
                        Some(PtyDriverEvent::Output(bytes)) => {
                            if self.state == SessionState::Starting {
                                self.state = SessionState::Running;
                            }
                            self.model.feed(&bytes);
                            for write_back in self.model.take_pty_writes() {
                                if let Err(e) = self.pty.write(&write_back) {
                                    warn!(event = "htty.broker.pty_query_response_failed", error = %e);
                                }
                            }
                            self.broadcast(Event::Output(bytes));
                        }
                        Some(PtyDriverEvent::Done) => {
                            debug!(event = "htty.broker.pty_eof");
                        }
                        Some(PtyDriverEvent::ExitCode(code)) => {
                            self.child_exit_code = Some(code);
                            self.broadcast(Event::ExitCode(code));
                            if self.exit_requested {
                                self.state = SessionState::Draining;
                            }
                        }
                        None => {
                            debug!(event = "htty.broker.pty_channel_closed");
                        }
                    }
                }

                _ = self.fifo_rx.recv() => {
                    self.pending_waitexit = true;
                    self.last_command_at = Instant::now();
                    debug!(event = "htty.broker.command_completed_detected");
                }

                _ = quiescence_tick.tick() => {
                    if self.pending_waitexit
                        && self.last_command_at.elapsed() >= self.config.quiescence_window
                    {
                        if let Err(e) = self.exit_coord.release().await {
                            warn!(event = "htty.broker.release_failed", error = %e);
                        }
                        self.pending_waitexit = false;
                    }
                }

                _ = heartbeat.tick() => {
                    debug!(event = "htty.broker.heartbeat", state = ?self.state);
                }
            }

            if self.state == SessionState::Draining && self.subscriptions.is_empty() {
                self.state = SessionState::Terminated;
            }
        }

        info!(event = "htty.broker.terminated");
    }

    async fn handle_command(&mut self, command: Command) -> CommandAck {
        match command {
            Command::SendKeys(elements) => match keys::translate_sequence(&elements) {
                Ok(bytes) => match self.pty.write(&bytes) {
                    Ok(()) => CommandAck::Enqueued,
                    Err(e) => CommandAck::Rejected(e),
                },
                Err(e) => CommandAck::Rejected(e),
            },

            Command::TakeSnapshot => {
                // Drain any output already read but not yet fed, per §5's
                // snapshot-after-keys ordering requirement. The broker's own
                // select loop already feeds output as it arrives, so a
                // non-blocking drain here just catches anything that landed
                // in the channel in the instant before this command ran.
                while let Ok(event) = self.pty_events.try_recv() {
                    match event {
                        PtyDriverEvent::Output(bytes) => {
                            self.model.feed(&bytes);
                            for write_back in self.model.take_pty_writes() {
                                let _ = self.pty.write(&write_back);
                            }
                        }
                        PtyDriverEvent::Pid(pid) => self.broadcast(Event::Pid(pid)),
                        PtyDriverEvent::ExitCode(code) => {
                            self.child_exit_code = Some(code);
                        }
                        PtyDriverEvent::Done => {}
                    }
                }
                let snapshot = self.model.snapshot();
                self.broadcast(Event::Snapshot(snapshot));
                CommandAck::Enqueued
            }

            Command::Resize { cols, rows } => match self.pty.resize(cols, rows) {
                Ok(()) => {
                    self.model.resize(cols, rows);
                    self.broadcast(Event::Resize { cols, rows });
                    CommandAck::Enqueued
                }
                Err(e) => CommandAck::Rejected(e),
            },

            Command::Debug(tag) => {
                self.broadcast(Event::Debug(tag));
                CommandAck::Enqueued
            }

            Command::Exit => {
                self.exit_requested = true;
                if self.child_exit_code.is_some() {
                    self.state = SessionState::Draining;
                    return CommandAck::Enqueued;
                }

                // Attempt the quiescent path first: release the FIFO as if
                // the quiescence window had already elapsed.
                if let Err(e) = self.exit_coord.release().await {
                    debug!(event = "htty.broker.exit_release_failed", error = %e);
                }

                let quiescent_code = tokio::time::timeout(
                    self.config.subprocess_wait_timeout,
                    wait_for_exit_code(&mut self.pty_events),
                )
                .await
                .ok()
                .flatten();

                let final_code = if let Some(code) = quiescent_code {
                    code
                } else {
                    self.force_terminated = true;
                    if let Err(e) = self.pty.terminate_graceful() {
                        warn!(event = "htty.broker.sigterm_failed", error = %e);
                    }
                    let sigterm_code = tokio::time::timeout(
                        self.config.graceful_termination_timeout,
                        wait_for_exit_code(&mut self.pty_events),
                    )
                    .await
                    .ok()
                    .flatten();

                    if sigterm_code.is_some() {
                        -(nix::sys::signal::Signal::SIGTERM as i32)
                    } else {
                        if let Err(e) = self.pty.terminate_forced() {
                            warn!(event = "htty.broker.sigkill_failed", error = %e);
                        }
                        let _ = tokio::time::timeout(
                            self.config.graceful_termination_timeout,
                            wait_for_exit_code(&mut self.pty_events),
                        )
                        .await;
                        -(nix::sys::signal::Signal::SIGKILL as i32)
                    }
                };

                info!(
                    event = "htty.broker.exit_code_finalized",
                    code = final_code,
                    force_terminated = self.force_terminated
                );
                self.child_exit_code = Some(final_code);
                self.broadcast(Event::ExitCode(final_code));
                self.state = SessionState::Draining;
                CommandAck::Enqueued
            }
        }
    }

    fn add_subscriber(&mut self, kinds: Vec<EventKind>) -> (SubscriptionId, mpsc::Receiver<Event>) {
        let id = self.next_sub_id;
        self.next_sub_id += 1;
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity);
        self.subscriptions.push(Subscription { id, kinds, tx });
        (id, rx)
    }

    fn broadcast(&mut self, event: Event) {
        let kind = event.kind();
        let mut overrun_ids = Vec::new();
        self.subscriptions.retain(|sub| {
            if !sub.wants(kind) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    overrun_ids.push(sub.id);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        for id in overrun_ids {
            warn!(event = "htty.broker.subscriber_overrun", subscription_id = id);
        }
    }
}

async fn wait_for_exit_code(pty_events: &mut mpsc::Receiver<PtyDriverEvent>) -> Option<i32> {
    while let Some(event) = pty_events.recv().await {
        if let PtyDriverEvent::ExitCode(code) = event {
            return Some(code);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_join_quotes_arguments_with_spaces() {
        let joined = shell_join("echo", &["hello world".to_string()]);
        assert_eq!(joined, "echo 'hello world'");
    }

    #[test]
    fn shell_join_leaves_simple_args_unquoted() {
        let joined = shell_join("ls", &["-la".to_string(), "/tmp".to_string()]);
        assert_eq!(joined, "ls -la /tmp");
    }

    #[test]
    fn quote_escapes_embedded_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
