//! `htty-engine`: headless terminal automation. Spawns a child program
//! under a PTY, interprets its output through a full VT/ANSI emulator,
//! and exposes the resulting screen state to an automating client that
//! injects keystrokes, takes snapshots, and waits for patterns.
//!
//! The primary surface is [`SessionHandle`]; the JSON-lines wire shim in
//! [`server`] is a thin adapter over the same `submit`/`subscribe`
//! primitives exposed by [`session::BrokerHandle`].

pub mod config;
pub mod errors;
pub mod exitcoord;
pub mod logging;
pub mod protocol;
pub mod pty;
pub mod server;
pub mod session;
pub mod terminal;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

pub use config::EngineConfig;
pub use errors::{CoreError, EngineError, EngineResult};
pub use protocol::KeyElement;
pub use session::{Command, CommandAck, Event, EventKind, SubscriptionId};
pub use terminal::Snapshot;

/// Parameters for starting a new session, mirroring `PtyDriver::start`'s
/// contract (§4.1) at the in-process API layer (§6).
pub struct StartOptions {
    pub command: String,
    pub args: Vec<String>,
    pub env_overrides: Vec<(String, String)>,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub config: EngineConfig,
}

impl StartOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env_overrides: Vec::new(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cols: 80,
            rows: 24,
            config: EngineConfig::default(),
        }
    }
}

/// The primary in-process handle to a live session (§6). Constructing one
/// spawns the PTY Driver, Terminal Model, Exit Coordinator, and the
/// Session Broker's own task; dropping it does not tear the session down —
/// callers that want a clean shutdown should `submit(Command::Exit)`.
#[derive(Clone)]
pub struct SessionHandle {
    broker: session::BrokerHandle,
    config: EngineConfig,
}

impl SessionHandle {
    /// Start a new session. The engine's own binary path is resolved via
    /// `std::env::current_exe` for the Exit Coordinator's shell wrapper
    /// (§4.4); callers embedding the engine with a different binary layout
    /// should set `HTTY_ENGINE_EXE` instead.
    pub async fn start(opts: StartOptions) -> EngineResult<Self> {
        let engine_exe = std::env::var("HTTY_ENGINE_EXE").ok().unwrap_or_else(|| {
            std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "htty-engine".to_string())
        });

        let config = opts.config.clone();
        let (broker, _join) = session::spawn(session::SpawnOptions {
            command: opts.command,
            args: opts.args,
            env_overrides: opts.env_overrides,
            cwd: opts.cwd,
            cols: opts.cols,
            rows: opts.rows,
            config: config.clone(),
            engine_exe,
        })?;

        Ok(Self { broker, config })
    }

    /// The underlying broker handle, for adapters (like the `serve`
    /// subcommand's JSON-lines shim) that need `submit`/`subscribe`
    /// directly rather than through the convenience methods below.
    pub fn broker_handle(&self) -> session::BrokerHandle {
        self.broker.clone()
    }

    pub async fn submit(&self, command: Command) -> EngineResult<CommandAck> {
        self.broker.submit(command).await
    }

    pub async fn subscribe(
        &self,
        kinds: Vec<EventKind>,
    ) -> EngineResult<(SubscriptionId, mpsc::Receiver<Event>)> {
        self.broker.subscribe(kinds).await
    }

    /// Translate and inject keystrokes. Named specials and literal text
    /// are both accepted per §6's `sendKeys` table.
    pub async fn send_keys(&self, keys: Vec<KeyElement>) -> EngineResult<()> {
        match self.broker.submit(Command::SendKeys(keys)).await? {
            CommandAck::Enqueued => Ok(()),
            CommandAck::Rejected(e) => Err(e),
        }
    }

    /// Take a screen snapshot, waiting up to `EngineConfig::snapshot_timeout`.
    pub async fn take_snapshot(&self) -> EngineResult<Snapshot> {
        let (_id, mut events) = self.broker.subscribe(vec![EventKind::Snapshot]).await?;
        self.broker.submit(Command::TakeSnapshot).await?;
        let result = tokio::time::timeout(self.config.snapshot_timeout, async {
            while let Some(event) = events.recv().await {
                if let Event::Snapshot(snapshot) = event {
                    return Some(snapshot);
                }
            }
            None
        })
        .await;
        match result {
            Ok(Some(snapshot)) => Ok(snapshot),
            _ => Err(EngineError::TimedOut),
        }
    }

    /// Resize the PTY and Terminal Model.
    pub async fn resize(&self, cols: u16, rows: u16) -> EngineResult<()> {
        match self.broker.submit(Command::Resize { cols, rows }).await? {
            CommandAck::Enqueued => Ok(()),
            CommandAck::Rejected(e) => Err(e),
        }
    }

    /// Block until the child's `ExitCode` event arrives, up to
    /// `EngineConfig::exit_timeout`.
    pub async fn wait_for_exit(&self) -> EngineResult<i32> {
        let (_id, mut events) = self.broker.subscribe(vec![EventKind::ExitCode]).await?;
        let result = tokio::time::timeout(self.config.exit_timeout, async {
            while let Some(event) = events.recv().await {
                if let Event::ExitCode(code) = event {
                    return Some(code);
                }
            }
            None
        })
        .await;
        match result {
            Ok(Some(code)) => Ok(code),
            _ => Err(EngineError::TimedOut),
        }
    }

    /// Poll accumulated `Output` bytes for a literal substring, as used by
    /// Testable Property scenario 6. Returns once the pattern has appeared
    /// anywhere in the output seen since this call began, or `TimedOut`
    /// after `timeout` (defaulting to `EngineConfig::expect_timeout`).
    pub async fn expect(&self, pattern: &str, timeout: Option<Duration>) -> EngineResult<()> {
        let (_id, mut events) = self.broker.subscribe(vec![EventKind::Output]).await?;
        let timeout = timeout.unwrap_or(self.config.expect_timeout);
        let result = tokio::time::timeout(timeout, async {
            let mut accumulated = String::new();
            while let Some(event) = events.recv().await {
                if let Event::Output(bytes) = event {
                    accumulated.push_str(&String::from_utf8_lossy(&bytes));
                    if accumulated.contains(pattern) {
                        return true;
                    }
                }
            }
            false
        })
        .await;
        match result {
            Ok(true) => Ok(()),
            _ => Err(EngineError::TimedOut),
        }
    }
}
