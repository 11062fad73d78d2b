use std::future::Future;
use std::io;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::delivery::connection::is_connection_error;
use crate::error::DeliveryError;
use crate::observability::metrics::get_metrics;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;

/// Reconnect budget for the ingestion socket: wait `base^attempt` seconds before retry `attempt`.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
        }
    }
}

impl RetrySettings {
    pub fn new(max_retries: u32, backoff_base_secs: u64) -> Self {
        Self {
            max_retries,
            backoff_base_secs,
        }
    }

    /// Delay before retry number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs.saturating_pow(attempt))
    }

    /// Sum of every backoff sleep when the whole budget is spent.
    pub fn worst_case_delay(&self) -> Duration {
        (1..=self.max_retries).map(|attempt| self.delay_for(attempt)).sum()
    }

    /// Run `operation` until it succeeds, retrying connection-level failures only.
    /// Any other I/O error is handed back untouched as [`DeliveryError::Io`].
    pub async fn run_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T, DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let metrics = get_metrics().await;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if is_connection_error(&e) && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    warn!(
                        "could not push logs, resetting connection and trying again in {:?} ({}/{}): {}",
                        delay, retries, self.max_retries, e
                    );
                    metrics.reconnects.inc();
                    sleep(delay).await;
                }
                Err(e) if is_connection_error(&e) => {
                    error!("all {} reconnect attempts failed: {}", retries, e);
                    return Err(DeliveryError::ConnectionFailure { retries, source: e });
                }
                Err(e) => return Err(DeliveryError::Io(e)),
            }
        }
    }
}

/// Random pause in `[0, max]`, used to desynchronise concurrent resolvers.
pub fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
