//! Wire types for the JSON-lines command/event shim (§6).
//!
//! Each variant maps to a JSONL object with `"type"` as the tag field,
//! the same `#[serde(tag = "type")]` shape the teacher crate's
//! `kild-daemon::protocol::messages` uses for its client/daemon messages.

use serde::{Deserialize, Serialize};

use crate::terminal::model::Snapshot;

/// Client -> Engine request messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireCommand {
    #[serde(rename = "sendKeys")]
    SendKeys { keys: Vec<String> },

    #[serde(rename = "takeSnapshot")]
    TakeSnapshot,

    #[serde(rename = "resize")]
    Resize { cols: u16, rows: u16 },

    #[serde(rename = "exit")]
    Exit,
}

/// Engine -> Client event messages, `{ "type": <kind>, "data": <payload> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WireEvent {
    #[serde(rename = "pid")]
    Pid { pid: u32 },

    #[serde(rename = "output")]
    Output { seq: String },

    #[serde(rename = "snapshot")]
    Snapshot { text: String, seq: String },

    #[serde(rename = "resize")]
    Resize { cols: u16, rows: u16 },

    #[serde(rename = "exitCode")]
    ExitCode { #[serde(rename = "exitCode")] exit_code: i32 },

    #[serde(rename = "debug")]
    Debug { tag: String },
}

impl WireEvent {
    pub fn output(bytes: &[u8]) -> Self {
        WireEvent::Output {
            seq: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn snapshot(snapshot: &Snapshot) -> Self {
        WireEvent::Snapshot {
            text: snapshot.text.clone(),
            seq: String::from_utf8_lossy(&snapshot.styled_seq()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_keys_roundtrip() {
        let cmd = WireCommand::SendKeys {
            keys: vec!["hi".into(), "Enter".into()],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""type":"sendKeys"#));
        let parsed: WireCommand = serde_json::from_str(&json).unwrap();
        match parsed {
            WireCommand::SendKeys { keys } => assert_eq!(keys, vec!["hi", "Enter"]),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn resize_roundtrip() {
        let cmd = WireCommand::Resize { cols: 80, rows: 24 };
        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: WireCommand = serde_json::from_str(&json).unwrap();
        match parsed {
            WireCommand::Resize { cols, rows } => {
                assert_eq!(cols, 80);
                assert_eq!(rows, 24);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn exit_code_event_field_name() {
        let event = WireEvent::ExitCode { exit_code: -15 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""exitCode":-15"#));
        let parsed: WireEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            WireEvent::ExitCode { exit_code } => assert_eq!(exit_code, -15),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn pid_event_roundtrip() {
        let event = WireEvent::Pid { pid: 4242 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"pid"#));
        let parsed: WireEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            WireEvent::Pid { pid } => assert_eq!(pid, 4242),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn output_event_preserves_escape_sequences() {
        let event = WireEvent::output(b"hello\x1b[31mworld\x1b[0m");
        if let WireEvent::Output { seq } = &event {
            assert!(seq.contains("\x1b[31m"));
        } else {
            panic!("wrong variant");
        }
        let json = serde_json::to_string(&event).unwrap();
        let parsed: WireEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            WireEvent::Output { seq } => assert!(seq.starts_with("hello")),
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
