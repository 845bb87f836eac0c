use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::TenancyConfig;
use crate::database::DatabaseError;

/// Bounded retry with linear backoff for transient backend errors.
///
/// Used only around provisioning and teardown steps; resolution never retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &TenancyConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_backoff())
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, DatabaseError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, attempt, self.max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
