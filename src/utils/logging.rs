// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or unparseable.
const DEFAULT_FILTER: &str = "info";

/// Installs the global tracing subscriber.
/// Filters come from `RUST_LOG`; logs go to stderr so JSON on stdout stays clean.
/// A second call is a no-op.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging setup complete.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_setup_does_not_panic() {
        setup_logging();
        setup_logging();
    }
}
