//! Bootstrap utilities for pipewright binaries.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the PIPEWRIGHT_LOG environment variable.
///
/// Defaults to "info" level if PIPEWRIGHT_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Backoff used while waiting for a control plane or broker to come up.
pub fn connect_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Connect to a service, retrying with exponential backoff.
///
/// Returns the last error once `backoff` is exhausted.
pub async fn connect_with_retry<T, E, F, Fut>(
    service_name: &str,
    backoff: ExponentialBuilder,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let client = connect
        .retry(backoff)
        .notify(|e: &E, delay: Duration| {
            warn!(
                service = %service_name,
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "Connection failed, retrying"
            );
        })
        .await?;
    info!(service = %service_name, "Connected");
    Ok(client)
}
