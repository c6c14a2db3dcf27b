pub mod credential_process;

/// Install the stderr log subscriber. `RUST_LOG`, when set, wins over `level`.
pub fn init_tracing(level: crate::config::LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
