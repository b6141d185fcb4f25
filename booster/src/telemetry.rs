//! Logging and metrics encoding.

use prometheus_client::{encoding::text::encode, registry::Registry};
use tracing::{subscriber::SetGlobalDefaultError, Level};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Content type of the Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Installs the global subscriber.
///
/// `RUST_LOG`-style directives are not read: `level` applies to every target.
pub fn init(level: Level, json: bool) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::new(level.to_string());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_line_number(true)
            .with_thread_ids(true)
            .with_file(true);
        tracing::subscriber::set_global_default(registry.with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        tracing::subscriber::set_global_default(registry.with(fmt_layer))
    }
}

/// Encodes every metric in `registry` in the text format.
pub fn encode_metrics(registry: &Registry) -> String {
    let mut buffer = String::new();
    // Writing to a String cannot fail
    let _ = encode(&mut buffer, registry);
    buffer
}
