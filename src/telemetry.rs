use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber.
///
/// `PISHARE_LOG` (full `EnvFilter` syntax) wins over `level` when set.
/// Output goes to stderr so the client's stdout carries only results.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("PISHARE_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
