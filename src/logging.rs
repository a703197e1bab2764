// 📜 Logging - tracing subscriber setup shared by both binaries

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins; otherwise `default_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
