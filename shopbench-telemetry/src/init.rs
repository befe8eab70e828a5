//! Subscriber initialization

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> Result<EnvFilter, Box<dyn std::error::Error>> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(DEFAULT_FILTER)?),
    }
}

/// Initialize console logging
///
/// The filter is read from `RUST_LOG` and falls back to `info`. Calling this
/// more than once is a no-op, as is calling it after another global
/// subscriber was installed.
///
/// # Example
/// ```
/// use shopbench_telemetry::init_telemetry;
/// init_telemetry("reward-eval").expect("Failed to initialize telemetry");
/// ```
pub fn init_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = env_filter()?;

    INIT.call_once(|| {
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init();

        if installed.is_ok() {
            tracing::info!(service.name = service_name, "Telemetry initialized");
        }
    });

    Ok(())
}

/// Initialize JSON-lines logging
///
/// Same filter handling as [`init_telemetry`], but every event is written as
/// one JSON object so batch evaluation logs can be post-processed.
pub fn init_json_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = env_filter()?;

    INIT.call_once(|| {
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init();

        if installed.is_ok() {
            tracing::info!(service.name = service_name, "JSON telemetry initialized");
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_telemetry("test-service").is_ok());
        assert!(init_telemetry("test-service").is_ok());
        assert!(init_json_telemetry("test-service").is_ok());
    }
}
