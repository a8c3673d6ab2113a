//! The JSON-lines command/event shim (§6): translates `WireCommand`/
//! `WireEvent` over a byte stream to/from the in-process
//! `session::Command`/`session::Event` vocabulary.
//!
//! Grounded on `kild-daemon::server::connection::handle_connection`'s
//! read-loop-plus-streaming-task shape, simplified from "many sessions
//! over a Unix socket, one `ClientId` per connection" to "exactly one
//! session over stdio" per §6's `serve` subcommand contract.

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, warn};

use crate::errors::WireError;
use crate::protocol::codec::{read_message, write_message};
use crate::protocol::keys::KeyElement;
use crate::protocol::messages::{WireCommand, WireEvent};
use crate::session::{BrokerHandle, Command, Event};

/// Run the shim for exactly one session: stream every broker event to
/// `writer` while translating incoming `WireCommand` lines from `reader`
/// into broker submissions. Returns once `reader` hits EOF or the event
/// stream closes (broker terminated).
pub async fn run_stdio_shim<R, W>(
    handle: BrokerHandle,
    mut reader: R,
    writer: W,
) -> Result<(), WireError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (_sub_id, events) = handle
        .subscribe(Vec::new())
        .await
        .map_err(|_| WireError::Closed)?;

    let stream_task = tokio::spawn(stream_events(events, writer));

    loop {
        match read_message::<_, WireCommand>(&mut reader).await {
            Ok(Some(wire_cmd)) => {
                let command = to_session_command(wire_cmd);
                if let Err(e) = handle.submit(command).await {
                    warn!(event = "htty.server.submit_failed", error = %e);
                }
            }
            Ok(None) => {
                debug!(event = "htty.server.stdin_closed");
                break;
            }
            Err(e) => {
                warn!(event = "htty.server.read_failed", error = %e);
                return Err(e);
            }
        }
    }

    let _ = stream_task.await;
    Ok(())
}

async fn stream_events<W>(mut events: tokio::sync::mpsc::Receiver<Event>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let wire_event = to_wire_event(&event);
        if let Err(e) = write_message(&mut writer, &wire_event).await {
            debug!(event = "htty.server.stream_write_failed", error = %e);
            break;
        }
    }
}

fn to_session_command(wire: WireCommand) -> Command {
    match wire {
        WireCommand::SendKeys { keys } => {
            Command::SendKeys(keys.into_iter().map(to_key_element).collect())
        }
        WireCommand::TakeSnapshot => Command::TakeSnapshot,
        WireCommand::Resize { cols, rows } => Command::Resize { cols, rows },
        WireCommand::Exit => Command::Exit,
    }
}

/// Per §6's key table: a `sendKeys` element is literal text unless it
/// names a recognized special. The wire format carries plain strings for
/// both, so disambiguation happens here by table lookup.
fn to_key_element(raw: String) -> KeyElement {
    KeyElement::from_wire(raw)
}

fn to_wire_event(event: &Event) -> WireEvent {
    match event {
        Event::Pid(pid) => WireEvent::Pid { pid: *pid },
        Event::Output(bytes) => WireEvent::output(bytes),
        Event::Snapshot(snapshot) => WireEvent::snapshot(snapshot),
        Event::Resize { cols, rows } => WireEvent::Resize {
            cols: *cols,
            rows: *rows,
        },
        Event::ExitCode(code) => WireEvent::ExitCode { exit_code: *code },
        Event::Debug(tag) => WireEvent::Debug { tag: tag.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_and_exit_translate_directly() {
        assert!(matches!(
            to_session_command(WireCommand::Resize { cols: 80, rows: 24 }),
            Command::Resize { cols: 80, rows: 24 }
        ));
        assert!(matches!(to_session_command(WireCommand::Exit), Command::Exit));
    }

    #[test]
    fn send_keys_disambiguates_literal_text_from_named_keys() {
        let cmd = to_session_command(WireCommand::SendKeys {
            keys: vec!["hi".to_string(), "Enter".to_string()],
        });
        match cmd {
            Command::SendKeys(elements) => {
                assert_eq!(elements.len(), 2);
                assert!(matches!(&elements[0], KeyElement::Text(s) if s == "hi"));
                assert!(matches!(&elements[1], KeyElement::Named(s) if s == "Enter"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
