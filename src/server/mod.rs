//! The JSON-lines command/event shim (§6), exposed by the `serve`
//! subcommand.

pub mod connection;

pub use connection::run_stdio_shim;
