//! Engine-wide configuration.
//!
//! Layered the way the teacher crate's `kild-core::config` layers
//! `KildConfig`: compiled-in defaults, optionally overridden by a TOML
//! file, then by `HTTY_*` environment variables, then by explicit
//! constructor arguments from the embedding application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-wide defaults controlling engine behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on retained scrollback, in bytes.
    pub scrollback_cap_bytes: usize,
    /// Default timeout for `TakeSnapshot`.
    #[serde(with = "duration_millis")]
    pub snapshot_timeout: Duration,
    /// Default timeout for a client-initiated `Exit`.
    #[serde(with = "duration_millis")]
    pub exit_timeout: Duration,
    /// Default timeout for `expect`-style pattern waits.
    #[serde(with = "duration_millis")]
    pub expect_timeout: Duration,
    /// Timeout the forced-exit path waits for a possibly in-flight exit code
    /// before sending SIGTERM.
    #[serde(with = "duration_millis")]
    pub subprocess_wait_timeout: Duration,
    /// Quiescence window: no command activity for this long before the
    /// Exit Coordinator releases the `wait-exit` helper.
    #[serde(with = "duration_millis")]
    pub quiescence_window: Duration,
    /// Resolution of the quiescence-check timer.
    #[serde(with = "duration_millis")]
    pub quiescence_tick: Duration,
    /// Resolution of the FIFO-existence poll.
    #[serde(with = "duration_millis")]
    pub fifo_poll_interval: Duration,
    /// Heartbeat interval keeping the broker's select loop responsive.
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    /// Bound on each subscriber's delivery queue.
    pub subscriber_queue_capacity: usize,
    /// Size of the PTY read-loop buffer.
    pub pty_read_buffer_bytes: usize,
    /// Timeout the graceful-termination path waits between SIGTERM and SIGKILL.
    #[serde(with = "duration_millis")]
    pub graceful_termination_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scrollback_cap_bytes: 1024 * 1024,
            snapshot_timeout: Duration::from_secs(5),
            exit_timeout: Duration::from_secs(5),
            expect_timeout: Duration::from_secs(5),
            subprocess_wait_timeout: Duration::from_secs(2),
            quiescence_window: Duration::from_millis(200),
            quiescence_tick: Duration::from_millis(10),
            fifo_poll_interval: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(60),
            subscriber_queue_capacity: 1024,
            pty_read_buffer_bytes: 128 * 1024,
            graceful_termination_timeout: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    /// Load defaults, then overlay a TOML file if `path` exists, then
    /// overlay recognized `HTTY_*` environment variables.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, crate::errors::EngineError> {
        let mut config = Self::default();

        if let Some(path) = path
            && path.exists()
        {
            let contents = std::fs::read_to_string(path)?;
            config = toml::from_str(&contents)
                .map_err(|e| crate::errors::EngineError::ProtocolError(e.to_string()))?;
        }

        if let Ok(cap) = std::env::var("HTTY_SCROLLBACK_CAP_BYTES")
            && let Ok(cap) = cap.parse()
        {
            config.scrollback_cap_bytes = cap;
        }

        Ok(config)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.quiescence_window, Duration::from_millis(200));
        assert_eq!(config.quiescence_tick, Duration::from_millis(10));
        assert_eq!(config.fifo_poll_interval, Duration::from_millis(50));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.subscriber_queue_capacity, 1024);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scrollback_cap_bytes, config.scrollback_cap_bytes);
        assert_eq!(parsed.quiescence_window, config.quiescence_window);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let config = EngineConfig::load(Some(std::path::Path::new("/nonexistent/htty.toml")))
            .unwrap();
        assert_eq!(config.scrollback_cap_bytes, EngineConfig::default().scrollback_cap_bytes);
    }
}
