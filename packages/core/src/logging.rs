use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging for the tracker.
///
/// `RUST_LOG` selects the filter (default `info`). Logs go to stderr so the
/// dashboard on stdout stays clean. Must be called once, from `main`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Logging initialized");
}
