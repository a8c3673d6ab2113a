//! Lifecycle and subscription types for the Session Broker (§4.3).
//!
//! `SessionState`/`Subscription` play the role `kild-daemon`'s
//! (unretrieved) `session::state::{DaemonSession, ClientId}` play there,
//! adapted to a single-session, broadcast-by-filter model instead of a
//! daemon tracking many named sessions and attach/detach client lists.

use tokio::sync::mpsc;

use crate::terminal::Snapshot;

/// Broker lifecycle (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Draining,
    Terminated,
}

pub type SubscriptionId = u64;

/// Filterable event categories a subscriber can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Pid,
    Output,
    Snapshot,
    Resize,
    ExitCode,
    Debug,
}

/// Events the broker emits to subscribers (§6's in-process vocabulary;
/// `protocol::messages::WireEvent` is the wire-shim encoding of these).
#[derive(Debug, Clone)]
pub enum Event {
    Pid(u32),
    Output(Vec<u8>),
    Snapshot(Snapshot),
    Resize { cols: u16, rows: u16 },
    ExitCode(i32),
    Debug(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Pid(_) => EventKind::Pid,
            Event::Output(_) => EventKind::Output,
            Event::Snapshot(_) => EventKind::Snapshot,
            Event::Resize { .. } => EventKind::Resize,
            Event::ExitCode(_) => EventKind::ExitCode,
            Event::Debug(_) => EventKind::Debug,
        }
    }
}

/// One subscriber's delivery queue and interest filter. An empty `kinds`
/// list means "subscribe to everything".
pub struct Subscription {
    pub id: SubscriptionId,
    pub kinds: Vec<EventKind>,
    pub tx: mpsc::Sender<Event>,
}

impl Subscription {
    pub fn wants(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}
