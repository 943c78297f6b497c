use tracing_subscriber::EnvFilter;

/// Initialize structured logging on stderr.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the provided level.
/// Calling this more than once is a no-op.
pub fn init(log_level: &str) {
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}
