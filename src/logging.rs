use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Verbosity follows `RUST_LOG`, `info` otherwise.
/// Logs go to stderr so stdout stays free for tool output (e.g. random pairs).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
