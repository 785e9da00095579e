//! Logging setup shared by the CLI and web binaries

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// With `force_debug` (the `--debug` flag) everything logs at debug level.
/// Otherwise `RUST_LOG` takes precedence, then `default_level` (e.g. "info").
pub fn init_logging(default_level: &str, force_debug: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(rust_log.as_deref(), default_level, force_debug);
    let filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_ascii_lowercase()));

    // A second init (e.g. from tests) is not an error worth surfacing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Picks the filter directives from the flag, the environment and the config
fn filter_directives(rust_log: Option<&str>, default_level: &str, force_debug: bool) -> String {
    if force_debug {
        return "debug".to_string();
    }
    match rust_log.map(str::trim) {
        Some(directives) if !directives.is_empty() => directives.to_string(),
        _ => default_level.to_ascii_lowercase(),
    }
}
