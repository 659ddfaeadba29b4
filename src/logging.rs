use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_LOG_FILTER: &str = "fabric_trace=info";

/// Initialize tracing to stderr. Stdout is reserved for JSON output.
///
/// `RUST_LOG` overrides the default filter. Calling this more than once is harmless;
/// later calls leave the first subscriber in place.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
    {
        tracing::debug!("Logging already initialized: {}", e);
    }
}
