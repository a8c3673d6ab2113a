use std::error::Error;

/// Base trait for all engine-surfaced errors.
///
/// Mirrors the teacher crate's `KildError`: a stable string code for
/// programmatic handling by wire-protocol clients, plus a hint about
/// whether the failure is a user mistake or an internal fault.
pub trait CoreError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling.
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as a warning (user-caused)
    /// rather than an error (engine-internal).
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Errors surfaced by the PTY driver, terminal model, and session broker.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn child process: {0}")]
    SpawnFailed(String),

    #[error("failed to allocate pty: {0}")]
    PtyAllocFailed(String),

    #[error("pty write did not complete: {0}")]
    WriteShort(String),

    #[error("pty write failed: connection broken")]
    WriteBroken,

    #[error("pty resize failed: {0}")]
    ResizeFailed(String),

    #[error("invalid key name '{0}'")]
    BadKey(String),

    #[error("operation timed out")]
    TimedOut,

    #[error("child process has already exited")]
    ChildExited,

    #[error("subscriber queue overflowed and was closed")]
    SubscriberOverrun,

    #[error("malformed command: {0}")]
    ProtocolError(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError for EngineError {
    fn error_code(&self) -> &'static str {
        match self {
            EngineError::SpawnFailed(_) => "SPAWN_FAILED",
            EngineError::PtyAllocFailed(_) => "PTY_ALLOC_FAILED",
            EngineError::WriteShort(_) => "WRITE_SHORT",
            EngineError::WriteBroken => "WRITE_BROKEN",
            EngineError::ResizeFailed(_) => "RESIZE_FAILED",
            EngineError::BadKey(_) => "BAD_KEY",
            EngineError::TimedOut => "TIMED_OUT",
            EngineError::ChildExited => "CHILD_EXITED",
            EngineError::SubscriberOverrun => "SUBSCRIBER_OVERRUN",
            EngineError::ProtocolError(_) => "PROTOCOL_ERROR",
            EngineError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            EngineError::Io(_) => "IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::BadKey(_) | EngineError::ProtocolError(_) | EngineError::SessionNotFound(_)
        )
    }
}

/// Errors surfaced by the JSON-lines wire codec, kept distinct from
/// `EngineError::ProtocolError` (which covers bad in-process commands)
/// so a malformed line on the wire can be diagnosed separately from a
/// well-formed command with an invalid payload.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed json on wire: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error on wire: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    Closed,
}

impl CoreError for WireError {
    fn error_code(&self) -> &'static str {
        match self {
            WireError::Malformed(_) => "PROTOCOL_ERROR",
            WireError::Io(_) => "IO_ERROR",
            WireError::Closed => "CONNECTION_CLOSED",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, WireError::Malformed(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(EngineError::WriteBroken.error_code(), "WRITE_BROKEN");
        assert_eq!(
            EngineError::BadKey("Bogus".into()).error_code(),
            "BAD_KEY"
        );
        assert!(EngineError::BadKey("Bogus".into()).is_user_error());
        assert!(!EngineError::WriteBroken.is_user_error());
    }

    #[test]
    fn wire_error_maps_malformed_to_protocol_error() {
        let err: serde_json::Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let wire = WireError::Malformed(err);
        assert_eq!(wire.error_code(), "PROTOCOL_ERROR");
        assert!(wire.is_user_error());
    }
}
