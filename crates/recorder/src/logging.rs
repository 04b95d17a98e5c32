//! Tracing subscriber setup

use crate::{LogConfig, RecorderError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
pub fn init_logging(config: &LogConfig) -> Result<(), RecorderError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| RecorderError::Logging(format!("bad level '{}': {}", config.level, e)))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| RecorderError::Logging(e.to_string()))
}
