//! The VT/ANSI Terminal Model (§4.2).

pub mod model;
pub mod style;

pub use model::{Snapshot, TerminalModel};
pub use style::{Color, Style, StyledRun};
