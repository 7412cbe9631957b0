//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter directives are read from here first, then from `RUST_LOG`.
pub const ENV_LOG: &str = "PTYCHECK_LOG";

/// Install a stderr fmt subscriber. Defaults to `warn`, or `info` when verbose.
pub fn init_tracing(verbose: bool, ansi: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let env_filter = std::env::var(ENV_LOG)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(std::io::stderr);

    // Already installed, e.g. when called twice.
    let _ = subscriber.try_init();
}
