use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogLevel;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns `false` when a subscriber was already installed, which happens on every
/// dev-cycle reload and in tests.
pub fn init_tracing(level: LogLevel) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}
