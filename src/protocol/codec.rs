//! JSON-lines framing: one object per line, newline-terminated.
//!
//! Grounded on the shape of the teacher crate's (unretrieved but
//! referenced) `kild-daemon::protocol::codec` module: `read_message`
//! pulls one line via `AsyncBufReadExt`, `write_message` serializes and
//! appends a trailing `\n`, flushing immediately so commands/events are
//! never left buffered in user space.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::WireError;

/// Read one JSON-lines message. Returns `Ok(None)` on clean EOF (no
/// partial line pending).
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, WireError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(trimmed)?;
    Ok(Some(value))
}

/// Serialize and write one JSON-lines message, flushing immediately.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
