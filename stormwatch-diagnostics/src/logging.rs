//! Structured logging setup

use stormwatch_core::StormwatchError;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_directive`. Returns `Ok(false)` when a
/// subscriber was already installed, which is not treated as an error.
pub fn init_logging(default_directive: &str) -> Result<bool, StormwatchError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            StormwatchError::InvalidConfiguration {
                field: "log_filter".to_string(),
                reason: e.to_string(),
            }
        })?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("Logging initialised");
    }
    Ok(installed)
}
