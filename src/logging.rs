//! Subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LEVEL: &str = "info";

/// Filter precedence: `RUST_LOG`, then `level`, then [`DEFAULT_LEVEL`].
pub fn filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        level
            .and_then(|l| EnvFilter::try_new(l).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
    })
}

/// Installs the global subscriber, writing to stderr. A second call is a no-op.
pub fn init(level: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
