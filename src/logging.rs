//! Diagnostic logging setup.
//!
//! Events go to stderr so stdout stays clean for `--format json` and for
//! piping optimized prompts. The filter comes from `PROMPTGREEN_LOG`, then
//! `RUST_LOG`, then `[logging] level`.

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(default_level: &str) {
    let filter = std::env::var("PROMPTGREEN_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
