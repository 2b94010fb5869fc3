use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "locstat=info";

/// Logs to stderr so stdout only carries the final summary. `RUST_LOG`
/// overrides the default filter.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
