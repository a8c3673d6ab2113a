//! Structured logging setup, grounded on the teacher crate's
//! `kild-core::logging::init_logging`: JSON-formatted `tracing` events on
//! stderr, filtered by an `EnvFilter` directive.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for the `htty-engine` binary.
///
/// The filter directive comes from `HTTY_LOG` if set, falling back to
/// `htty_engine=info`. Call once per process; a second call is a no-op
/// (the underlying `tracing` global subscriber can only be installed once).
pub fn init_logging() {
    let directive =
        std::env::var("HTTY_LOG").unwrap_or_else(|_| "htty_engine=info".to_string());

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(
            EnvFilter::try_new(&directive)
                .unwrap_or_else(|_| EnvFilter::new("htty_engine=info")),
        )
        .try_init();
}
