//! The engine's own minimal binary (§6): exactly two subcommands, both
//! required by the core's own contract rather than a general-purpose
//! front-end (out of scope per §1).
//!
//! Grounded on `kild`/`kild-peek`'s `main.rs` shape (`init_logging` then
//! dispatch on parsed subcommand) and `app.rs`'s `clap::Command` builder
//! style rather than the derive API, matching what the teacher workspace
//! actually uses despite enabling the `derive` cargo feature.

use clap::{Arg, Command};
use tracing::{error, info};

use htty_engine::{EngineError, SessionHandle, StartOptions};

fn build_cli() -> Command {
    Command::new("htty-engine")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Headless terminal automation engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("wait-exit")
                .about("Block until the Exit Coordinator releases the FIFO at <path>")
                .arg(Arg::new("path").required(true).index(1)),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the JSON-lines command/event shim over stdio for one session"),
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    htty_engine::logging::init_logging();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("wait-exit", sub)) => {
            let path = sub.get_one::<String>("path").expect("required");
            wait_exit(path)?;
        }
        Some(("serve", _)) => {
            serve().await?;
        }
        _ => unreachable!("clap enforces subcommand_required"),
    }

    Ok(())
}

/// `<engine> wait-exit <path>`: create the FIFO (mode 0600) if absent and
/// block reading lines until one equals `exit` (§6).
fn wait_exit(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::BufRead;

    let path = std::path::Path::new(path);
    if !path.exists() {
        nix::unistd::mkfifo(path, nix::sys::stat::Mode::from_bits_truncate(0o600))?;
    }

    info!(event = "htty.wait_exit.waiting", path = %path.display());
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        if line == "exit" {
            info!(event = "htty.wait_exit.released", path = %path.display());
            return Ok(());
        }
    }

    Ok(())
}

/// `<engine> serve`: run one session's JSON-lines shim over stdio. The
/// child command comes from `HTTY_TEST_PROGRAM` (test/demo override) or
/// falls back to the user's shell.
async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let command = std::env::var("HTTY_TEST_PROGRAM")
        .unwrap_or_else(|_| std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()));

    let session = SessionHandle::start(StartOptions::new(command))
        .await
        .map_err(|e: EngineError| {
            error!(event = "htty.serve.start_failed", error = %e);
            e
        })?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    htty_engine::server::run_stdio_shim(session.broker_handle(), stdin, stdout).await?;

    Ok(())
}
