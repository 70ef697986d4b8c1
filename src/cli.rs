//! CLI utilities for tracing

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing with optional verbosity.
pub fn init_tracing(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
