//! The Session Broker (§4.3).

pub mod broker;
pub mod state;

pub use broker::{BrokerHandle, Command, CommandAck, SpawnOptions, spawn};
pub use state::{Event, EventKind, SessionState, SubscriptionId};
