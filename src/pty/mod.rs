//! The PTY Driver (§4.1).

pub mod driver;

pub use driver::{PtyDriver, PtyDriverEvent, SpawnSpec};
