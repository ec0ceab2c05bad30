//! Logging init for the command-line tool: stderr, filtered by `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(debug: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if debug {
        "info,urlzip=debug"
    } else {
        "warn"
    }
}

/// Install a stderr subscriber. Stdout may be carrying the archive, so
/// nothing is ever logged there. A second call is a no-op.
pub fn init_logging(debug: bool, quiet: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug, quiet)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
