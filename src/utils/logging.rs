use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process embedding the manager.
///
/// `RUST_LOG` wins when it is set; otherwise `default_level` is used, and an
/// unparsable `default_level` falls back to `info`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init so tests and embedders can call this more than once
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
